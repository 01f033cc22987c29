pub mod f32;
pub mod io;
pub mod sensor;
pub mod traits;

pub use self::f32::ImageF32;
pub use self::sensor::SensorImage;
pub use self::traits::{ImageView, ImageViewMut};
