pub mod camera;
pub mod compositor;
pub mod detector;
pub mod renderer;
pub mod rgba_converter;

pub use camera::{CameraStream, start_camera_stream};
pub use compositor::start_frame_compositor;
pub use detector::OrtFaceMesh;
pub use renderer::SoftwareRenderer;
