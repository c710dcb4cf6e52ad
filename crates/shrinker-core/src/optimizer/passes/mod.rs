mod enum_unboxing;
mod horizontal_class_merging;
mod lens_flattening;

pub use enum_unboxing::EnumUnboxingPass;
pub use horizontal_class_merging::HorizontalClassMergingPass;
pub use lens_flattening::LensFlatteningPass;
