mod model;
mod ops;
mod schema;

pub use model::*;
pub use ops::*;
pub use schema::*;
