mod error;
mod resource;
mod spec;
mod state;
mod upload;

pub use error::{AdoptError, TextureError};
pub use resource::Texture;
pub use spec::{InitialData, TextureDesc, TextureSpec, ViewFormats};
pub use state::{ImageState, ResourceState, log_state_transition};
pub use upload::{CopyBox, CopyFootprint, UploadLayout, align_up_pow2};
