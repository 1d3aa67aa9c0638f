//! Module loading, lifecycle, and storage aggregation for actionbus
//!
//! A module is a self-contained unit of behavior conforming to the
//! [`BusModule`] contract. The [`ModuleRegistry`] turns configured module
//! specs into running instances wired into the bus, and the storage
//! aggregator presents one uniform storage API over the storage-capable
//! modules.

pub mod builtin;
pub mod registry;
pub mod storage;
pub mod traits;

pub use registry::{LoadedModule, ModuleCatalog, ModuleRegistry};
pub use storage::{ModuleStorage, SharedStorageRegistry, StorageRegistry};
pub use traits::{BusModule, InitResponse, ModuleApi, ModuleContext, StorageBackend};
