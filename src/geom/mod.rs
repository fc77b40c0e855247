pub mod dmath;
pub mod point;
pub mod rotation;
pub mod sphere;
