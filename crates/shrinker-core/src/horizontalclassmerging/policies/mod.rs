mod no_direct_subclasses;
mod no_instance_fields;
mod no_interfaces;
mod no_native_methods;
mod no_runtime_type_checks;
mod no_static_class_initializer;
mod not_entry_point;
mod not_enum;
mod not_live;
mod same_instantiation;
mod same_nest_host;
mod same_parent_class;

pub use no_direct_subclasses::NoDirectSubclasses;
pub use no_instance_fields::NoInstanceFields;
pub use no_interfaces::NoInterfaces;
pub use no_native_methods::NoNativeMethods;
pub use no_runtime_type_checks::NoRuntimeTypeChecks;
pub use no_static_class_initializer::NoStaticClassInitializer;
pub use not_entry_point::NotEntryPoint;
pub use not_enum::NotEnum;
pub use not_live::NotLive;
pub use same_instantiation::SameInstantiation;
pub use same_nest_host::SameNestHost;
pub use same_parent_class::SameParentClass;
