mod desert_pyramid;
mod end_city;

pub use desert_pyramid::DesertPyramid;
pub use end_city::EndCity;
