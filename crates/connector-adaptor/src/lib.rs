//! The adaptor contract (the repository-specific plugin surface) and
//! the full/incremental/group push drivers (C7/C8/C9) that wrap it
//! with retry and journal bookkeeping.

mod adaptor;
mod cmdline;
mod doc_response;
mod drivers;

pub use adaptor::{Adaptor, AuthDecision, DocRequest};
pub use cmdline::{
    encode_frame, metadata_pairs, parse_frame, CmdlineAdaptor, CmdlineError, Command, ParsedFrame,
    DEFAULT_DELIMITER,
};
pub use doc_response::{ContentTransformer, DocResponse, OutputMode, ResponseError, TransformWrite};
pub use drivers::{FullPushDriver, GroupPushDriver, IncrementalPushDriver};
