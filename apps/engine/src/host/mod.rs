pub mod ingest;
pub mod messages;

pub use ingest::{adapt_boundary, adapt_comments, adapt_routes, parse_collection};
pub use messages::{
    compose_created_at, parse_map_data, CommentDraft, CommentForm, CommentPayload, ImagePayload,
    InboundMessage, MapData, OutboundMessage, PluginData, PopupAction,
};
