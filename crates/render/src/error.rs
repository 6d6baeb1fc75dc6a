/// Renderer errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("surface size {width}x{height} is invalid")]
    InvalidSize { width: u32, height: u32 },

    #[error("zoom factor must be positive and finite, got {0}")]
    InvalidZoom(f32),

    #[error("invalid render setting: {0}")]
    InvalidConfig(&'static str),

    /// A cached bitmap does not match the surface it would replace
    #[error("bitmap is {found:?}, surface is {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

pub type RenderResult<T> = Result<T, RenderError>;
