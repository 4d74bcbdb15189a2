pub mod curve;
pub mod offset;
pub mod relation;
pub mod sine;
pub mod source;

pub use curve::SampledCurve;
pub use offset::OffsetTable;
pub use relation::{default_relations, RelationError, SlaveRelation, SlaveRelations};
pub use sine::{SineGenerator, Waveform};
pub use source::{BuildContext, SourceId, SourceSet, Variation, VariationSource};
