use ash::vk;

use super::error::TextureError;
use super::spec::InitialData;

/// Rounds `value` up to a multiple of `alignment`. `None` on overflow.
#[inline]
pub fn align_up_pow2(value: u32, alignment: u32) -> Option<u32> {
    debug_assert!(alignment.is_power_of_two(), "alignment {alignment} is not a power of two");
    value
        .checked_add(alignment - 1)
        .map(|padded| padded & !(alignment - 1))
}

/// How texel rows are laid out inside a staging buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CopyFootprint {
    pub offset: u64,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub row_pitch: u32,
    pub format: vk::Format,
}

/// Texel region of a copy, `[left, right) x [top, bottom) x [front, back)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CopyBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

impl CopyBox {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            front: 0,
            right: width,
            bottom: height,
            back: 1,
        }
    }
}

/// Staging layout for uploading `height` rows of `row_size` bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UploadLayout {
    pub row_size: u32,
    pub row_pitch: u32,
    pub height: u32,
}

impl UploadLayout {
    /// Fails for empty textures and for rows whose size or pitch overflows.
    pub fn new(
        width: u32,
        height: u32,
        texel_size: u32,
        pitch_alignment: u32,
    ) -> Result<Self, TextureError> {
        if width == 0 || height == 0 || texel_size == 0 {
            return Err(TextureError::InvalidInitialData(format!(
                "cannot upload into a {width}x{height} texture with {texel_size}-byte texels"
            )));
        }
        let row_pitch = texel_size
            .checked_mul(width)
            .and_then(|row_size| Some((row_size, align_up_pow2(row_size, pitch_alignment)?)));
        let Some((row_size, row_pitch)) = row_pitch else {
            return Err(TextureError::InvalidInitialData(format!(
                "row of {width} texels of {texel_size} bytes overflows the copy pitch"
            )));
        };
        Ok(Self {
            row_size,
            row_pitch,
            height,
        })
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        u64::from(self.row_pitch) * u64::from(self.height)
    }

    pub fn footprint(&self, width: u32, format: vk::Format) -> CopyFootprint {
        CopyFootprint {
            offset: 0,
            width,
            height: self.height,
            depth: 1,
            row_pitch: self.row_pitch,
            format,
        }
    }

    /// Checks that `initial` holds every row this layout will read.
    pub fn validate(&self, initial: &InitialData<'_>) -> Result<(), TextureError> {
        if initial.row_stride < self.row_size {
            return Err(TextureError::InvalidInitialData(format!(
                "row stride {} is smaller than a row of {} bytes",
                initial.row_stride, self.row_size
            )));
        }
        let required =
            u64::from(initial.row_stride) * u64::from(self.height - 1) + u64::from(self.row_size);
        if (initial.data.len() as u64) < required {
            return Err(TextureError::InvalidInitialData(format!(
                "{} bytes supplied, {} required",
                initial.data.len(),
                required
            )));
        }
        Ok(())
    }

    /// Copies rows from `initial` into `dst`, one row every `row_pitch` bytes.
    /// `initial` must have passed [`UploadLayout::validate`].
    pub fn repack(&self, initial: &InitialData<'_>, dst: &mut [u8]) {
        let row_size = self.row_size as usize;
        let src_rows = initial.data.chunks(initial.row_stride as usize);
        let dst_rows = dst.chunks_mut(self.row_pitch as usize);
        for (src, dst) in src_rows.zip(dst_rows).take(self.height as usize) {
            dst[..row_size].copy_from_slice(&src[..row_size]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_next_multiple() {
        assert_eq!(align_up_pow2(300, 256), Some(512));
        assert_eq!(align_up_pow2(256, 256), Some(256));
        assert_eq!(align_up_pow2(1, 256), Some(256));
        assert_eq!(align_up_pow2(0, 256), Some(0));
        assert_eq!(align_up_pow2(u32::MAX - 10, 256), None);
    }

    #[test]
    fn natural_row_of_300_bytes_pads_to_512() {
        // 75 RGBA8 texels per row
        let layout = UploadLayout::new(75, 10, 4, 256).unwrap();
        assert_eq!(layout.row_size, 300);
        assert_eq!(layout.row_pitch, 512);
        assert_eq!(layout.total_size(), 512 * 10);
    }

    #[test]
    fn repack_places_rows_on_pitch_boundaries() {
        let layout = UploadLayout::new(2, 3, 1, 4).unwrap();
        // caller rows are 3 bytes apart, the last byte of each is padding
        let src = [1, 2, 0xff, 3, 4, 0xff, 5, 6];
        let initial = InitialData::new(&src, 3);
        layout.validate(&initial).unwrap();

        let mut dst = vec![0u8; layout.total_size() as usize];
        layout.repack(&initial, &mut dst);
        assert_eq!(dst, vec![1, 2, 0, 0, 3, 4, 0, 0, 5, 6, 0, 0]);
    }

    #[test]
    fn validate_rejects_short_data() {
        let layout = UploadLayout::new(4, 4, 4, 256).unwrap();
        let data = vec![0u8; 16 * 3];
        assert!(matches!(
            layout.validate(&InitialData::new(&data, 16)),
            Err(TextureError::InvalidInitialData(_))
        ));
        assert!(matches!(
            layout.validate(&InitialData::new(&vec![0u8; 64], 8)),
            Err(TextureError::InvalidInitialData(_))
        ));
    }

    #[test]
    fn oversized_rows_are_rejected() {
        assert!(matches!(
            UploadLayout::new(u32::MAX / 2, 1, 4, 256),
            Err(TextureError::InvalidInitialData(_))
        ));
        // fits in a row, but not once padded to the pitch
        assert!(matches!(
            UploadLayout::new(u32::MAX - 10, 1, 1, 256),
            Err(TextureError::InvalidInitialData(_))
        ));
    }

    #[test]
    fn empty_textures_are_rejected() {
        assert!(UploadLayout::new(0, 4, 4, 256).is_err());
        assert!(UploadLayout::new(4, 0, 4, 256).is_err());
    }
}
