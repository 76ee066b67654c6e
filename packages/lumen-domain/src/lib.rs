pub mod gate;
pub mod intent;
pub mod lexical;
pub mod normalize;
