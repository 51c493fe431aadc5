use std::fmt;

use ash::vk;

/// Formats of the views to attach to a texture. `UNDEFINED` means no view.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ViewFormats {
    pub srv: vk::Format,
    pub rtv: vk::Format,
    pub dsv: vk::Format,
}

impl ViewFormats {
    pub fn shader(format: vk::Format) -> Self {
        Self {
            srv: format,
            ..Default::default()
        }
    }

    pub fn srv(mut self, format: vk::Format) -> Self {
        self.srv = format;
        self
    }

    pub fn rtv(mut self, format: vk::Format) -> Self {
        self.rtv = format;
        self
    }

    pub fn dsv(mut self, format: vk::Format) -> Self {
        self.dsv = format;
        self
    }

    #[inline]
    pub fn has_srv(&self) -> bool {
        self.srv != vk::Format::UNDEFINED
    }

    #[inline]
    pub fn has_rtv(&self) -> bool {
        self.rtv != vk::Format::UNDEFINED
    }

    #[inline]
    pub fn has_dsv(&self) -> bool {
        self.dsv != vk::Format::UNDEFINED
    }
}

/// Shape of a texture resource as the device sees it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// Row-major linear layout so the CPU can address texels directly.
    pub dynamic: bool,
}

#[derive(PartialEq, Eq, Clone)]
pub struct TextureSpec {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub format: vk::Format,
    pub views: ViewFormats,
    pub usage: vk::ImageUsageFlags,
    pub dynamic: bool,
    pub debug_name: Option<String>,
}

impl Default for TextureSpec {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            samples: 1,
            format: vk::Format::UNDEFINED,
            views: ViewFormats::default(),
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            dynamic: false,
            debug_name: None,
        }
    }
}

impl TextureSpec {
    pub fn new(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    pub fn srv_format(mut self, format: vk::Format) -> Self {
        self.views.srv = format;
        self
    }

    pub fn rtv_format(mut self, format: vk::Format) -> Self {
        self.views.rtv = format;
        self.usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        self
    }

    pub fn dsv_format(mut self, format: vk::Format) -> Self {
        self.views.dsv = format;
        self.usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn debug_name(mut self, debug_name: impl AsRef<str>) -> Self {
        self.debug_name = Some(debug_name.as_ref().to_owned());
        self
    }

    pub fn desc(&self) -> TextureDesc {
        TextureDesc {
            width: self.width,
            height: self.height,
            samples: self.samples,
            format: self.format,
            usage: self.usage,
            dynamic: self.dynamic,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.debug_name.as_deref().unwrap_or("<unnamed>")
    }
}

impl fmt::Display for TextureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TextureSpec(size={}x{}, samples={}, format={:?}, srv={:?}, rtv={:?}, dsv={:?}, usage={:?}, dynamic={}, debugName={})",
            self.width,
            self.height,
            self.samples,
            self.format,
            self.views.srv,
            self.views.rtv,
            self.views.dsv,
            self.usage,
            self.dynamic,
            self.name()
        )
    }
}

/// Texel rows to upload into a freshly created texture.
#[derive(Debug, Copy, Clone)]
pub struct InitialData<'a> {
    pub data: &'a [u8],
    /// Distance in bytes between the starts of consecutive rows in `data`.
    pub row_stride: u32,
}

impl<'a> InitialData<'a> {
    pub fn new(data: &'a [u8], row_stride: u32) -> Self {
        Self { data, row_stride }
    }
}
