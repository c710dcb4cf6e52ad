use strum::{Display, EnumString};

/// Why an enum stays boxed. Displayed in the debug report as
/// `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    // Class shape
    Subtypes,
    Interface,
    InstanceField,
    VirtualMethod,
    UnexpectedDirectMethod,
    Pinned,

    // Code analysis
    ConstClass,
    RuntimeTypeCheck,
    InvalidPhi,
    InvalidInvoke,
    InvalidInvokeOnArray,
    ValuesInvoke,
    ValueOfInvoke,
    CompareToInvoke,
    NameInvoke,
    ToStringInvoke,
    UnsupportedLibraryCall,
    InvalidFieldPut,
    FieldPutOnEnum,
    TypeMismatchFieldPut,
    InvalidIfTypes,
    ImplicitUpCastInReturn,
    EnumMethodCalledWithNullReceiver,
    OtherUnsupportedInstruction,

    // Finish analysis
    NoInit,
    InvalidInit,
    InvalidClinit,
    MissingInfoMap,
    UnexpectedStaticField,
}
