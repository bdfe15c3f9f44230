use ffmpeg_next as ffmpeg;
use thiserror::Error;

/// Errors that can abort a transcode request.
///
/// The two non-fatal codec states ("needs more input", "end of stream") never
/// surface here; they only terminate the drain loop they occur in. Everything
/// below aborts the whole request.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// Target identifier is not in the supported table. Raised during request
    /// validation, before any native resource is touched.
    #[error("unsupported target media type: {0:?}")]
    UnsupportedTarget(String),

    #[error("opening input {locator:?} failed: {source}")]
    OpenInput {
        locator: String,
        #[source]
        source: ffmpeg::Error,
    },

    #[error("no eligible audio stream in input")]
    NoAudioStream,

    #[error("no decoder for codec {0:?}")]
    DecoderNotFound(ffmpeg::codec::Id),

    #[error("setting up decoder failed: {0}")]
    DecoderSetup(#[source] ffmpeg::Error),

    #[error("encoder {0:?} is not available in this FFmpeg build")]
    EncoderNotFound(&'static str),

    #[error("stream is not audio; this deployment only transcodes audio")]
    NotAudio,

    /// The encoder advertises supported channel layouts and the requested
    /// layout is not among them. There is no automatic downmix.
    #[error("encoder does not support channel layout {0}")]
    UnsupportedLayout(&'static str),

    #[error("setting up encoder failed: {0}")]
    EncoderSetup(#[source] ffmpeg::Error),

    #[error("opening output {path:?} failed: {source}")]
    OpenOutput {
        path: String,
        #[source]
        source: ffmpeg::Error,
    },

    #[error("filter {0:?} is not available")]
    FilterNotFound(&'static str),

    #[error("building filter graph failed: {0}")]
    FilterGraph(#[source] ffmpeg::Error),

    #[error("writing container header failed: {0}")]
    WriteHeader(#[source] ffmpeg::Error),

    #[error("reading packet failed: {0}")]
    ReadPacket(#[source] ffmpeg::Error),

    #[error("decoding failed: {0}")]
    Decode(#[source] ffmpeg::Error),

    #[error("filtering failed: {0}")]
    Filter(#[source] ffmpeg::Error),

    #[error("encoding failed: {0}")]
    Encode(#[source] ffmpeg::Error),

    #[error("writing packet failed: {0}")]
    WritePacket(#[source] ffmpeg::Error),

    #[error("writing container trailer failed: {0}")]
    WriteTrailer(#[source] ffmpeg::Error),
}
