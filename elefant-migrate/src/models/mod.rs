mod column;
mod column_spec;
mod foreign_key;
mod table;
mod version;

pub use column::*;
pub use column_spec::*;
pub use foreign_key::*;
pub use table::*;
pub use version::*;
