pub(crate) mod checksum;
pub(crate) mod extract;
pub(crate) mod info;
pub(crate) mod path_helpers;

pub(crate) use checksum::command_checksum;
pub(crate) use extract::command_extract;
pub(crate) use info::command_info;
