use clap::ValueEnum;

/// Standard medical viewing planes used to preset reslice axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

/// Numeric storage kind of a scalar buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum ScalarKind {
    Int8,
    #[value(name = "uint8")]
    UInt8,
    Int16,
    #[value(name = "uint16")]
    UInt16,
    Int32,
    #[value(name = "uint32")]
    UInt32,
    Float16,
    Float32,
    Float64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum InterpolationMode {
    #[default]
    Nearest,
    Linear,
    Cubic,
}

/// Policy for samples whose index falls next to or outside the input extent.
///
/// Only `Clamp` is implemented, the other modes are rejected when a reslice
/// is executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum BorderMode {
    #[default]
    Clamp,
    Wrap,
    Mirror,
}

/// Reduction applied to the samples of a thick slab.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SlabMode {
    #[default]
    Min,
    Max,
    Mean,
    Sum,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
