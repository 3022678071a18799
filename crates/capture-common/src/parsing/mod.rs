pub mod buffer_index;
pub mod header;
pub mod param_type;
pub mod procfs;
pub mod record;
pub mod schema;
pub mod sockaddr;

pub use buffer_index::{BufferIndex, IndexError};
pub use header::{EventHeader, HEADER_SIZE};
pub use param_type::{ParamType, ParamTypeError, PrefixWidth, param_bounds};
pub use record::{DecodeError, EventRecord, Param, ParamError, RecordReader};
pub use schema::{EventSchema, EventType, MAX_EVENT_PARAMS, ParamInfo};
