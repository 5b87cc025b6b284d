//! Shared protocol constants for the sift plain-text transport

// Sentinel responses. A name search that comes up empty answers with
// FILE_NOT_FOUND; the bulk transfer commands answer with NO_FILE_FOUND.
// Both are complete messages on their own - no payload follows either.
pub const FILE_NOT_FOUND: &str = "File not found";
pub const NO_FILE_FOUND: &str = "No file found";

// Prefix for non-fatal server-side failures (archive build, unreadable
// file mid-send). The session stays open after one of these.
pub const ERROR_PREFIX: &str = "Error: ";

// Redirect message: `REDIRECT <host> <port>` as the entire response.
// The client reconnects to the named peer and resubmits the same command.
pub const REDIRECT_PREFIX: &str = "REDIRECT ";

// Acknowledgment token sent by the receiver after it has read a declared
// payload length. Fixed size, no terminator.
pub const ACK: &[u8; 3] = b"ACK";

// Payload stream chunk size
pub const CHUNK_SIZE: usize = 64 * 1024;

// Maximum entries a single bulk search may collect. Traversal stops once
// the cap is hit and the truncated set is served as-is.
pub const MAX_RESULTS: usize = 1000;

// Maximum length of a single text message (command or response line).
// Longer input is a framing error, not a command.
pub const MAX_LINE: usize = 4096;

// Default port the primary listens on
pub const DEFAULT_PORT: u16 = 8080;
