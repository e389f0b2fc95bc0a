// Adapters layer: concrete implementations of the domain ports (DNS, storage).

pub mod dns;
pub mod storage;

pub use dns::HickoryResolver;
pub use storage::LocalStorage;
