//! Output negotiation: force the container format for the requested target,
//! open one encoder per decoded stream and allocate the matching output
//! streams, then write the container header.

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, format};
use tracing::debug;

use super::error::TranscodeError;
use super::pipeline::{DecodedStream, NegotiatedStream};
use super::{layout_name, TranscodeRequest};

use std::path::Path;

pub fn open(
    request: &TranscodeRequest,
    output_path: &Path,
    decoded: Vec<DecodedStream>,
) -> Result<(format::context::Output, Vec<NegotiatedStream>), TranscodeError> {
    // The container is forced from the target table, never guessed from the
    // file extension. Raw PCM in particular must not grow a header.
    let mut octx = format::output_as(&output_path, request.target.container()).map_err(
        |source| TranscodeError::OpenOutput {
            path: output_path.display().to_string(),
            source,
        },
    )?;

    let encoder_name = request.target.encoder_name();
    let codec = codec::encoder::find_by_name(encoder_name)
        .ok_or(TranscodeError::EncoderNotFound(encoder_name))?;
    let audio_codec = codec.audio().map_err(|_| TranscodeError::NotAudio)?;

    let layout = request.channel_layout();
    if let Some(mut layouts) = audio_codec.channel_layouts() {
        if !layouts.any(|l| l == layout) {
            return Err(TranscodeError::UnsupportedLayout(layout_name(layout)));
        }
    }

    let global_header = octx
        .format()
        .flags()
        .contains(format::Flags::GLOBAL_HEADER);

    let mut negotiated = Vec::with_capacity(decoded.len());
    for stream in decoded {
        // Prefer the decoder's native sample format when the encoder accepts
        // it, otherwise take the first format the encoder advertises.
        let supported: Vec<format::Sample> = audio_codec
            .formats()
            .map(|formats| formats.collect())
            .unwrap_or_default();
        let sample_format = if supported.is_empty() || supported.contains(&stream.decoder.format())
        {
            stream.decoder.format()
        } else {
            supported[0]
        };

        // The decode time base already went through the validity fallback at
        // input setup, so it is safe to hand to the encoder as-is.
        let encode_time_base = stream.decode_time_base;

        let mut encoder = codec::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(TranscodeError::EncoderSetup)?;
        encoder.set_rate(request.sample_rate);
        encoder.set_channel_layout(layout);
        encoder.set_format(sample_format);
        encoder.set_time_base(encode_time_base);
        if global_header {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let opened = encoder.open_as(codec).map_err(TranscodeError::EncoderSetup)?;

        let mut ost = octx
            .add_stream(codec.id())
            .map_err(TranscodeError::EncoderSetup)?;
        ost.set_parameters(&opened);
        // The opened context is authoritative: opening may rewrite the time
        // base the configuration asked for.
        ost.set_time_base(opened.time_base());
        let output_index = ost.index();

        debug!(
            stream_index = stream.stream_index,
            output_index,
            encoder = encoder_name,
            rate = request.sample_rate,
            layout = layout_name(layout),
            format = ?sample_format,
            "Negotiated encoder"
        );

        negotiated.push(NegotiatedStream {
            stream_index: stream.stream_index,
            decoder: stream.decoder,
            decode_layout: stream.decode_layout,
            encoder: opened,
            input_time_base: stream.input_time_base,
            decode_time_base: stream.decode_time_base,
            output_index,
        });
    }

    octx.write_header().map_err(TranscodeError::WriteHeader)?;
    Ok((octx, negotiated))
}
