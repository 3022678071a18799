//! Protocol constants shared by producer and consumer.

/// Largest encoded size of a single parameter.
pub const MAX_ARG_SIZE: u32 = 65000;

/// Size of the per-worker scratch arena. Only half of it is usable for a
/// single event.
pub const SCRATCH_SIZE: usize = 1 << 18;
pub const SCRATCH_SIZE_HALF: usize = SCRATCH_SIZE / 2;

/// Payload bytes inspected by the dynamic snaplen classifier.
pub const DPI_LOOKAHEAD_SIZE: usize = 16;

pub const SNAPLEN: u32 = 80;
pub const SNAPLEN_EXTENDED: u32 = 2000;
pub const SNAPLEN_FULLCAPTURE_PORT: u32 = 16000;
pub const SNAPLEN_DNS_UDP: u32 = 512;

pub const PORT_DNS: u16 = 53;
pub const PORT_MYSQL: u16 = 3306;
pub const PORT_POSTGRES: u16 = 5432;
pub const PORT_MONGODB: u16 = 27017;
pub const PORT_STATSD: u16 = 8125;

/// Kernel limit for command names, terminating NUL included.
pub const TASK_COMM_LEN: usize = 16;
