//! Target markup: masking, bit templates, link resolution, table flattening
//! and the generator that ties them together.

pub mod escape;
pub mod generator;
pub mod links;
pub mod table;
pub mod templates;

pub use generator::{GeneratorContext, GeneratorOutput, GeneratorSettings, MarkupGenerator};
pub use links::{LinkResolver, LinkTarget};
pub use templates::{Family, Modes, Template};
