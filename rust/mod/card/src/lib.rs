//! Print request cards: model, remote list codec, Graph store, workflow
//! engine and report views.

pub mod codec;
pub mod engine;
pub mod fields;
pub mod model;
pub mod report;
pub mod store;

pub use codec::{encode_new, encode_patch, parse_remote_item, NativeFields};
pub use engine::{CardEngine, Snapshot};
pub use fields::CardField;
pub use model::{derive_profit, Card, CardPatch, CardStatus, ImageKind, ImageUpload, NewCard};
pub use store::{CardStore, ConnectionReport, GraphCardStore};
