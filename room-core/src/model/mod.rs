//! Domain types for the room control plane. Values here are plain data
//! — they cross component boundaries by copy/clone, the same way the
//! specification treats `RoomSpec` and `RoomEvent` as values rather
//! than shared, mutable state.

mod epr;
mod event;
mod mount;
mod pull;
mod room;
mod room_spec;

pub use epr::EprRange;
pub use event::{RoomAction, RoomEvent};
pub use mount::{Mount, MountKind};
pub use pull::{ProgressDetail, PullLayer, PullState};
pub use room::{Room, RoomStats, SessionMember};
pub use room_spec::{
    ApiVersion, AudioCodec, BrowserPolicy, Capture, Resources, RoomSpec, VideoCodec,
};
