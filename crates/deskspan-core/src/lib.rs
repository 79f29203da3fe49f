//! # deskspan-core
//!
//! Shared library for DeskSpan containing the network protocol codec, the
//! virtual-desktop domain model, and the layout-independent key translation
//! table.
//!
//! DeskSpan lets one keyboard and mouse drive several networked machines as
//! one extended desktop: input captured on the server is forwarded, over an
//! encrypted channel, to whichever machine currently owns the cursor.  This
//! crate is the foundation both sides agree on.  It has zero dependencies on
//! OS APIs, sockets, or async runtimes:
//!
//! - **`protocol`** – the typed wire records and the length-delimited binary
//!   codec that frames them.
//! - **`domain`** – session tickets, the shared coordinate plane, the layout
//!   engine that detects edge crossings, and repair of peer-declared data.
//! - **`keymap`** – scan-code based key translation so a key press lands on
//!   the same physical position regardless of keyboard layout.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::geometry::{Delta, LayoutPoint, LocalPoint, Rect};
pub use domain::layout::{CrossingKind, DesktopLayout, LayoutError, MoveClassification};
pub use domain::ticket::{Ticket, TicketCounter};
pub use domain::validation::{repair, ClientValidInfo, FixableIssues};
pub use protocol::codec::{
    decode_client, decode_server, encode_client, encode_server, ProtocolError,
};
pub use protocol::messages::{ClientMessage, ServerMessage};
