//! Mapping between video steps and rows of an external data series

use serde::{Deserialize, Serialize};

/// Data length of a clip before any data is assigned
pub const DEFAULT_DATA_LENGTH: usize = 2;

/// The window of an external series shown on video steps: step `s` shows
/// row `start_index + s * stride`.
///
/// A stored clip length of 0 means the whole data length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DataClipFields", into = "DataClipFields")]
pub struct DataClip {
    start_index: usize,
    stride: usize,
    clip_length: usize,
    data_length: usize,
}

impl DataClip {
    /// A clip over `data_length` rows showing every row
    pub fn new(data_length: usize) -> Self {
        Self {
            start_index: 0,
            stride: 1,
            clip_length: 0,
            data_length: data_length.max(1),
        }
    }

    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// Set the data length (at least 1), keeping the start index inside the
    /// data. Must be called whenever the series changes shape.
    pub fn set_data_length(&mut self, length: usize) -> bool {
        let length = length.max(1);
        if length == self.data_length {
            return false;
        }
        self.data_length = length;
        self.start_index = self.start_index.min(length - 1);
        if self.clip_length >= length {
            self.clip_length = 0;
        }
        true
    }

    /// Number of steps in the clip
    pub fn clip_length(&self) -> usize {
        if self.clip_length == 0 {
            self.data_length
        } else {
            self.clip_length
        }
    }

    /// Set the clip length, at most the data length. Returns true if it
    /// changed.
    pub fn set_clip_length(&mut self, length: usize) -> bool {
        let length = length.min(self.data_length);
        let stored = if length == self.data_length { 0 } else { length };
        let changed = stored != self.clip_length;
        self.clip_length = stored;
        changed
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Set the first data row, clamped into the data. Returns true if it
    /// changed.
    pub fn set_start_index(&mut self, start: usize) -> bool {
        let start = start.min(self.data_length - 1);
        let changed = start != self.start_index;
        self.start_index = start;
        changed
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Set the rows per step, clamped to `1..=max(1, data_length - 1)`.
    /// Returns true if it changed.
    pub fn set_stride(&mut self, stride: usize) -> bool {
        let stride = stride.min(self.data_length - 1).max(1);
        let changed = stride != self.stride;
        self.stride = stride;
        changed
    }

    /// Steps whose rows lie inside the data, at most the clip length and at
    /// least 1
    pub fn available_clip_length(&self) -> usize {
        (1..self.clip_length())
            .rev()
            .find(|&i| self.step_to_index(i) < self.data_length)
            .map_or(1, |i| i + 1)
    }

    /// Data row shown at a step. Not bounds-checked; see [`checked_index`].
    ///
    /// [`checked_index`]: DataClip::checked_index
    pub fn step_to_index(&self, step: usize) -> usize {
        self.start_index + step * self.stride
    }

    /// Data row shown at a step, or `None` when the step shows no data
    pub fn checked_index(&self, step: usize) -> Option<usize> {
        (step < self.available_clip_length()).then(|| self.step_to_index(step))
    }

    /// Step showing a data row; rows between two steps map to the earlier
    /// step. `None` for rows before the start index.
    pub fn index_to_step(&self, index: usize) -> Option<usize> {
        index
            .checked_sub(self.start_index)
            .map(|offset| offset / self.stride)
    }

    /// True if the row is shown at some step of the clip
    pub fn includes_index(&self, index: usize) -> bool {
        match index.checked_sub(self.start_index) {
            Some(offset) => {
                offset % self.stride == 0 && offset / self.stride < self.available_clip_length()
            }
            None => false,
        }
    }
}

impl Default for DataClip {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_LENGTH)
    }
}

/// Persisted fields of a [`DataClip`]. Older documents omit the data
/// length; [`into_clip`](DataClipFields::into_clip) takes it from the loaded
/// series instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataClipFields {
    pub start_index: usize,
    pub stride: usize,
    pub length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_length: Option<usize>,
}

impl DataClipFields {
    /// Clip over `data_length` rows, clamped through the setters
    pub fn into_clip(self, data_length: usize) -> DataClip {
        let mut clip = DataClip::new(data_length);
        clip.set_start_index(self.start_index);
        clip.set_stride(self.stride);
        clip.set_clip_length(self.length);
        clip
    }
}

impl From<DataClipFields> for DataClip {
    fn from(fields: DataClipFields) -> Self {
        let data_length = fields.data_length.unwrap_or(DEFAULT_DATA_LENGTH);
        fields.into_clip(data_length)
    }
}

impl From<DataClip> for DataClipFields {
    fn from(clip: DataClip) -> Self {
        Self {
            start_index: clip.start_index,
            stride: clip.stride,
            length: clip.clip_length(),
            data_length: Some(clip.data_length),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let clip = DataClip::default();
        assert_eq!(clip.data_length(), 2);
        assert_eq!(clip.clip_length(), 2);
        assert_eq!(clip.stride(), 1);
        assert_eq!(clip.available_clip_length(), 2);
    }

    #[test]
    fn test_setters_clamp() {
        let mut clip = DataClip::new(10);
        assert!(clip.set_start_index(20));
        assert_eq!(clip.start_index(), 9);
        assert!(clip.set_stride(50));
        assert_eq!(clip.stride(), 9);
        assert!(!clip.set_stride(9));
        assert!(clip.set_stride(0));
        assert_eq!(clip.stride(), 1);

        assert!(clip.set_clip_length(4));
        assert_eq!(clip.clip_length(), 4);
        assert!(clip.set_clip_length(25));
        assert_eq!(clip.clip_length(), 10);

        clip.set_data_length(0);
        assert_eq!(clip.data_length(), 1);
        assert_eq!(clip.start_index(), 0);
    }

    #[test]
    fn test_index_mapping() {
        let mut clip = DataClip::new(100);
        clip.set_start_index(3);
        clip.set_stride(4);
        assert_eq!(clip.step_to_index(2), 11);
        assert_eq!(clip.index_to_step(12), Some(2));
        assert_eq!(clip.index_to_step(2), None);
        assert!(clip.includes_index(11));
        assert!(!clip.includes_index(12));
        assert_eq!(clip.available_clip_length(), 25);
        assert_eq!(clip.checked_index(24), Some(99));
        assert_eq!(clip.checked_index(25), None);
    }

    #[test]
    fn test_available_length_within_data() {
        for data_length in 1..30 {
            for start in 0..data_length {
                for stride in 1..6 {
                    for length in 1..=data_length {
                        let mut clip = DataClip::new(data_length);
                        clip.set_start_index(start);
                        clip.set_stride(stride);
                        clip.set_clip_length(length);
                        let available = clip.available_clip_length();
                        assert!(available <= clip.clip_length());
                        for step in 0..available {
                            assert!(clip.step_to_index(step) < data_length);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_document_shape() {
        let mut clip = DataClip::new(40);
        clip.set_start_index(2);
        clip.set_stride(3);
        let value = serde_json::to_value(&clip).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"startIndex": 2, "stride": 3, "length": 40, "dataLength": 40})
        );

        let loaded: DataClip =
            serde_json::from_value(serde_json::json!({"startIndex": 99, "stride": 3, "length": 5})).unwrap();
        assert_eq!(loaded.data_length(), DEFAULT_DATA_LENGTH);
        assert_eq!(loaded.start_index(), 1);
        assert_eq!(loaded.stride(), 1);

        let fields: DataClipFields =
            serde_json::from_value(serde_json::json!({"startIndex": 4, "stride": 3, "length": 5})).unwrap();
        assert_eq!(fields.data_length, None);
        let restored = fields.into_clip(20);
        assert_eq!(restored.start_index(), 4);
        assert_eq!(restored.stride(), 3);
        assert_eq!(restored.clip_length(), 5);
    }
}
