use std::fmt;

use ash::vk;

/// How the GPU is currently allowed to access a resource.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum ResourceState {
    #[default]
    Common,
    CopyDestination,
    CopySource,
    ShaderReadable,
    RenderTarget,
    DepthWrite,
    DepthRead,
    GenericRead,
    Present,
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Common => "Common",
            ResourceState::CopyDestination => "CopyDestination",
            ResourceState::CopySource => "CopySource",
            ResourceState::ShaderReadable => "ShaderReadable",
            ResourceState::RenderTarget => "RenderTarget",
            ResourceState::DepthWrite => "DepthWrite",
            ResourceState::DepthRead => "DepthRead",
            ResourceState::GenericRead => "GenericRead",
            ResourceState::Present => "Present",
        };
        f.write_str(s)
    }
}

impl ResourceState {
    pub fn image_state(self) -> ImageState {
        match self {
            ResourceState::Common => ImageState::UNDEFINED,
            ResourceState::CopyDestination => ImageState::TRANSFER_DST,
            ResourceState::CopySource => ImageState::TRANSFER_SRC,
            ResourceState::ShaderReadable => ImageState::SHADER_READ,
            ResourceState::RenderTarget => ImageState::COLOR_ATTACHMENT_WRITE,
            ResourceState::DepthWrite => ImageState::DEPTH_ATTACHMENT_WRITE,
            ResourceState::DepthRead => ImageState::DEPTH_READ,
            ResourceState::GenericRead => ImageState::GENERIC_READ,
            ResourceState::Present => ImageState::PRESENT,
        }
    }

    #[inline]
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::CopyDestination | ResourceState::RenderTarget | ResourceState::DepthWrite
        )
    }
}

/// Layout plus the synchronization scope a resource state implies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageState {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl ImageState {
    pub const UNDEFINED: ImageState = ImageState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
        access: vk::AccessFlags2::NONE,
    };

    pub const TRANSFER_DST: ImageState = ImageState {
        layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_WRITE,
    };

    pub const TRANSFER_SRC: ImageState = ImageState {
        layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_READ,
    };

    pub const SHADER_READ: ImageState = ImageState {
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        access: vk::AccessFlags2::SHADER_READ,
    };

    pub const COLOR_ATTACHMENT_WRITE: ImageState = ImageState {
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    };

    pub const DEPTH_ATTACHMENT_WRITE: ImageState = ImageState {
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
    };

    pub const DEPTH_READ: ImageState = ImageState {
        layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        stage: vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
    };

    pub const GENERIC_READ: ImageState = ImageState {
        layout: vk::ImageLayout::GENERAL,
        stage: vk::PipelineStageFlags2::ALL_COMMANDS,
        access: vk::AccessFlags2::MEMORY_READ,
    };

    pub const PRESENT: ImageState = ImageState {
        layout: vk::ImageLayout::PRESENT_SRC_KHR,
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    };
}

fn layout_str(layout: vk::ImageLayout) -> &'static str {
    match layout {
        vk::ImageLayout::UNDEFINED => "UNDEFINED",
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => "COLOR_ATTACHMENT_OPTIMAL",
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => "DEPTH_STENCIL_ATTACHMENT_OPTIMAL",
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => "DEPTH_STENCIL_READ_ONLY_OPTIMAL",
        vk::ImageLayout::PRESENT_SRC_KHR => "PRESENT_SRC_KHR",
        vk::ImageLayout::GENERAL => "GENERAL",
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => "TRANSFER_SRC_OPTIMAL",
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => "TRANSFER_DST_OPTIMAL",
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => "SHADER_READ_ONLY_OPTIMAL",
        _ => "OTHER",
    }
}

fn stage_str(stage: vk::PipelineStageFlags2) -> String {
    const NAMES: [(vk::PipelineStageFlags2, &str); 7] = [
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
    ];
    join_flags(NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, n)| *n))
}

fn access_str(access: vk::AccessFlags2) -> String {
    const NAMES: [(vk::AccessFlags2, &str); 7] = [
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::SHADER_READ, "SHADER_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACHMENT_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_STENCIL_ATTACHMENT_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_STENCIL_ATTACHMENT_WRITE"),
    ];
    join_flags(NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, n)| *n))
}

fn join_flags<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.collect();
    if names.is_empty() {
        "NONE".to_owned()
    } else {
        names.join(" | ")
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageState(layout={}, stage={}, access={})",
            layout_str(self.layout),
            stage_str(self.stage),
            access_str(self.access)
        )
    }
}

pub fn log_state_transition(old: ResourceState, new: ResourceState, debug_name: &str) {
    let (old_image, new_image) = (old.image_state(), new.image_state());
    log::debug!(
        "{} {} -> {}\n     layout: {} -> {}\n     stage:  {} -> {}\n     access: {} -> {}",
        debug_name,
        old,
        new,
        layout_str(old_image.layout),
        layout_str(new_image.layout),
        stage_str(old_image.stage),
        stage_str(new_image.stage),
        access_str(old_image.access),
        access_str(new_image.access)
    );
}
