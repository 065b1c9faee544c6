mod connectivity;
mod kv;
mod remote;

pub use self::connectivity::{Connectivity, ConnectivityOperation, ConnectivityOutput};
pub use self::kv::{
    KeyNamespace, KeyValue, KvError, KvKey, KvOperation, KvOutput, KvResult, StorageErrorCode,
    MAX_KEY_LENGTH, MAX_VALUE_SIZE,
};
pub use self::remote::{Remote, RemoteError, RemoteOperation, RemoteOutput};

pub use crux_core::render::Render;

use crate::app::App;
use crate::event::Event;

#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub connectivity: Connectivity<Event>,
    pub kv: KeyValue<Event>,
    pub remote: Remote<Event>,
    pub render: Render<Event>,
}
