// Types fondamentaux d'Arbor
// Principe: valeurs immuables, ordre canonique, sérialisation déterministe

pub mod primitives;
pub mod reference;
pub mod signatures;
pub mod values;
pub mod update;
pub mod code;
pub mod account;
pub mod request;
pub mod response;

pub use primitives::*;
pub use reference::*;
pub use signatures::*;
pub use values::*;
pub use update::*;
pub use code::*;
pub use account::*;
pub use request::*;
pub use response::*;
