use ash::vk;

/// Bytes per texel for the uncompressed formats textures are created with.
///
/// Returns `None` for block-compressed or otherwise unsupported formats.
pub fn texel_size(format: vk::Format) -> Option<u32> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_UINT | vk::Format::S8_UINT => 1,

        vk::Format::R8G8_UNORM
        | vk::Format::R16_UNORM
        | vk::Format::R16_UINT
        | vk::Format::R16_SFLOAT
        | vk::Format::R5G6B5_UNORM_PACK16
        | vk::Format::A1R5G5B5_UNORM_PACK16
        | vk::Format::D16_UNORM => 2,

        vk::Format::R8G8B8_UNORM | vk::Format::B8G8R8_UNORM => 3,

        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::R16G16_SFLOAT
        | vk::Format::R32_UINT
        | vk::Format::R32_SFLOAT
        | vk::Format::D32_SFLOAT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::X8_D24_UNORM_PACK32 => 4,

        vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SFLOAT
        | vk::Format::R32G32_SFLOAT
        | vk::Format::D32_SFLOAT_S8_UINT => 8,

        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,

        _ => return None,
    };
    Some(size)
}

/// True for formats a depth-stencil view can be created with.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_formats_have_sizes() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(texel_size(vk::Format::R5G6B5_UNORM_PACK16), Some(2));
        assert_eq!(texel_size(vk::Format::R32G32B32A32_SFLOAT), Some(16));
        assert_eq!(texel_size(vk::Format::D32_SFLOAT), Some(4));
    }

    #[test]
    fn compressed_formats_are_rejected() {
        assert_eq!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
        assert_eq!(texel_size(vk::Format::UNDEFINED), None);
    }

    #[test]
    fn depth_formats_are_recognised() {
        assert!(is_depth_format(vk::Format::D32_SFLOAT));
        assert!(!is_depth_format(vk::Format::R32_SFLOAT));
    }
}
