//! Conversion graph construction. Every stream gets its own
//! abuffer -> aresample -> abuffersink graph that turns whatever the decoder
//! produces into exactly what the encoder was opened with.

use std::collections::BTreeMap;

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, filter};
use tracing::debug;

use super::error::TranscodeError;
use super::pipeline::{NegotiatedStream, StreamPipeline};
use super::{layout_name, TranscodeRequest};

pub fn init(
    request: &TranscodeRequest,
    negotiated: Vec<NegotiatedStream>,
) -> Result<BTreeMap<usize, StreamPipeline>, TranscodeError> {
    let abuffer = filter::find("abuffer").ok_or(TranscodeError::FilterNotFound("abuffer"))?;
    let abuffersink =
        filter::find("abuffersink").ok_or(TranscodeError::FilterNotFound("abuffersink"))?;

    let mut pipelines = BTreeMap::new();
    for stream in negotiated {
        let mut graph = filter::Graph::new();

        let args = format!(
            "time_base={}:sample_rate={}:sample_fmt={}:channel_layout=0x{:x}",
            stream.decode_time_base,
            stream.decoder.rate(),
            stream.decoder.format().name(),
            stream.decode_layout.bits()
        );
        debug!(stream_index = stream.stream_index, %args, "Adding buffer source");

        graph
            .add(&abuffer, "in", &args)
            .map_err(TranscodeError::FilterGraph)?;
        graph
            .add(&abuffersink, "out", "")
            .map_err(TranscodeError::FilterGraph)?;

        // One resample stage does rate conversion, channel remap and sample
        // format conversion together. Option names are the post-5.1
        // spellings; the short aliases are gone from current FFmpeg.
        let body = format!(
            "aresample=in_sample_rate={}:out_sample_rate={}\
             :in_sample_fmt={}:out_sample_fmt={}\
             :in_chlayout=0x{:x}:out_chlayout={}",
            stream.decoder.rate(),
            stream.encoder.rate(),
            stream.decoder.format().name(),
            stream.encoder.format().name(),
            stream.decode_layout.bits(),
            layout_name(request.channel_layout()),
        );

        debug!(stream_index = stream.stream_index, %body, "Parsing filter graph");
        graph
            .output("in", 0)
            .map_err(TranscodeError::FilterGraph)?
            .input("out", 0)
            .map_err(TranscodeError::FilterGraph)?
            .parse(&body)
            .map_err(TranscodeError::FilterGraph)?;
        graph.validate().map_err(TranscodeError::FilterGraph)?;

        // Fixed-frame-size encoders need the sink to batch samples for them.
        if let Some(codec) = stream.encoder.codec() {
            if !codec
                .capabilities()
                .contains(codec::Capabilities::VARIABLE_FRAME_SIZE)
            {
                graph
                    .get("out")
                    .ok_or(TranscodeError::Filter(ffmpeg::Error::FilterNotFound))?
                    .sink()
                    .set_frame_size(stream.encoder.frame_size());
            }
        }

        let stream_index = stream.stream_index;
        pipelines.insert(stream_index, StreamPipeline::new(stream, graph));
    }

    Ok(pipelines)
}
