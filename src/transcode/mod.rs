//! Single-shot transcode pipeline: demux -> decode -> filter -> encode -> mux.
//!
//! A request runs as one synchronous pipeline on the calling thread. All
//! native state (container contexts, per-stream pipelines, frame and packet
//! buffers) is allocated fresh per request, owned by the request's stack and
//! released in reverse acquisition order when it unwinds -- nothing is shared
//! between concurrent requests.

pub mod error;
mod filter;
mod input;
mod output;
mod pipeline;

use std::collections::BTreeMap;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::{ChannelLayout, Packet};
use tracing::{debug, info};

pub use error::TranscodeError;
pub use pipeline::StreamPipeline;

pub const MIN_SAMPLE_RATE: i32 = 16_000;
pub const MAX_SAMPLE_RATE: i32 = 48_000;
pub const DEFAULT_SAMPLE_RATE: i32 = 44_100;
pub const DEFAULT_CHANNELS: i32 = 2;

/// Supported output targets: a fixed mapping from public identifiers to
/// concrete encoder names and container hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// PCM 16-bit little-endian in a WAV container.
    Wav,
    /// MPEG layer III via libmp3lame (availability depends on the FFmpeg build).
    Mp3,
    /// Raw PCM 16-bit little-endian, no container framing.
    Pcm,
}

impl OutputTarget {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "wav" => Some(OutputTarget::Wav),
            "mp3" => Some(OutputTarget::Mp3),
            "pcm" | "raw" => Some(OutputTarget::Pcm),
            _ => None,
        }
    }

    pub fn encoder_name(self) -> &'static str {
        match self {
            OutputTarget::Wav | OutputTarget::Pcm => "pcm_s16le",
            OutputTarget::Mp3 => "libmp3lame",
        }
    }

    /// Container format forced on the output context. Raw PCM uses the bare
    /// `s16le` format so no container framing is written at all.
    pub fn container(self) -> &'static str {
        match self {
            OutputTarget::Wav => "wav",
            OutputTarget::Mp3 => "mp3",
            OutputTarget::Pcm => "s16le",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputTarget::Wav => "audio/wav",
            OutputTarget::Mp3 => "audio/mpeg",
            OutputTarget::Pcm => "application/octet-stream",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputTarget::Wav => "wav",
            OutputTarget::Mp3 => "mp3",
            OutputTarget::Pcm => "raw",
        }
    }
}

/// A validated transcode request. Construction clamps the numeric parameters
/// and rejects unknown targets; no native resource is touched until
/// [`run_transcode`].
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source: String,
    pub target: OutputTarget,
    /// 1 or 2. Anything else is clamped to stereo before negotiation runs.
    pub channels: i32,
    /// Clamped to [16000, 48000]; below-range falls back to 44100.
    pub sample_rate: i32,
}

impl TranscodeRequest {
    pub fn new(
        source: impl Into<String>,
        target: &str,
        channels: Option<i32>,
        sample_rate: Option<i32>,
    ) -> Result<Self, TranscodeError> {
        let target = OutputTarget::from_name(target)
            .ok_or_else(|| TranscodeError::UnsupportedTarget(target.to_string()))?;

        let mut channels = channels.unwrap_or(DEFAULT_CHANNELS);
        if !(1..=2).contains(&channels) {
            channels = DEFAULT_CHANNELS;
        }

        let mut sample_rate = sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        if sample_rate < MIN_SAMPLE_RATE {
            sample_rate = DEFAULT_SAMPLE_RATE;
        }
        if sample_rate > MAX_SAMPLE_RATE {
            sample_rate = MAX_SAMPLE_RATE;
        }

        Ok(Self {
            source: source.into(),
            target,
            channels,
            sample_rate,
        })
    }

    /// Channel layout negotiated for the output, derived from the clamped
    /// channel count.
    pub fn channel_layout(&self) -> ChannelLayout {
        channel_layout(self.channels)
    }
}

/// Raw channel count to layout. Mono maps to the single front-center layout,
/// any other count to plain stereo. This is a deliberate simplification: true
/// multichannel layouts are not passed through.
pub fn channel_layout(channels: i32) -> ChannelLayout {
    if channels == 1 {
        ChannelLayout::MONO
    } else {
        ChannelLayout::STEREO
    }
}

/// Layout name as understood by filter arguments. Only the two layouts the
/// normalization above can produce ever reach this.
pub(crate) fn layout_name(layout: ChannelLayout) -> &'static str {
    if layout == ChannelLayout::MONO {
        "mono"
    } else {
        "stereo"
    }
}

/// Run one complete transcode: open and probe the source, negotiate encoders
/// and open the destination, build filter graphs, then drive packets through
/// every per-stream pipeline and flush them at end-of-stream.
pub fn run_transcode(request: &TranscodeRequest, output_path: &Path) -> Result<(), TranscodeError> {
    info!(
        source = %request.source,
        target = ?request.target,
        channels = request.channels,
        sample_rate = request.sample_rate,
        "Starting transcode"
    );

    let (mut ictx, decoded) = input::open(request)?;
    let (mut octx, negotiated) = output::open(request, output_path, decoded)?;
    let mut pipelines: BTreeMap<usize, StreamPipeline> = filter::init(request, negotiated)?;

    // Demux loop. The packets() iterator swallows read errors, so read
    // manually: clean EOF ends the loop, anything else aborts the request.
    let mut packet = Packet::empty();
    loop {
        match packet.read(&mut ictx) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => break,
            Err(e) => return Err(TranscodeError::ReadPacket(e)),
        }

        // Packets of streams without a pipeline are discarded.
        let Some(pipeline) = pipelines.get_mut(&packet.stream()) else {
            continue;
        };
        pipeline.feed_packet(&mut packet, &mut octx)?;
    }

    debug!("Input exhausted, flushing pipelines");
    for pipeline in pipelines.values_mut() {
        pipeline.flush(&mut octx)?;
    }

    octx.write_trailer().map_err(TranscodeError::WriteTrailer)?;
    info!(output = ?output_path, "Transcode finished");
    Ok(())
}
