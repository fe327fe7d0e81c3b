pub mod audio;
pub mod playback;
pub mod session;
pub mod synthesis;

pub use audio::{CaptureDevice, CaptureStream, CpalCaptureDevice, Recorder, StreamGuard};
pub use playback::{
    ChannelId, ChannelStatus, OutputBackend, PlaybackController, PlaybackEvent, RodioOutput,
    SourceId, TransportState,
};
pub use session::{Artifact, Notice, Session, SessionContext, SessionParts};
pub use synthesis::{preview_text, SynthesisClient};
