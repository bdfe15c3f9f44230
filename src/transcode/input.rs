//! Input probing: open the source container and set up a decoder for every
//! audio stream. Non-audio streams are left without a pipeline and their
//! packets get discarded by the demux loop.

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, format, media, Rational};
use tracing::debug;

use super::error::TranscodeError;
use super::pipeline::DecodedStream;
use super::{channel_layout, TranscodeRequest};

pub fn open(
    request: &TranscodeRequest,
) -> Result<(format::context::Input, Vec<DecodedStream>), TranscodeError> {
    let ictx = format::input(&request.source).map_err(|source| TranscodeError::OpenInput {
        locator: request.source.clone(),
        source,
    })?;

    let mut decoded = Vec::new();
    for stream in ictx.streams() {
        if stream.parameters().medium() != media::Type::Audio {
            continue;
        }

        let context = codec::context::Context::from_parameters(stream.parameters())
            .map_err(TranscodeError::DecoderSetup)?;
        let codec_id = context.id();
        if codec::decoder::find(codec_id).is_none() {
            return Err(TranscodeError::DecoderNotFound(codec_id));
        }

        let mut decoder = context
            .decoder()
            .audio()
            .map_err(TranscodeError::DecoderSetup)?;
        decoder
            .set_parameters(stream.parameters())
            .map_err(TranscodeError::DecoderSetup)?;

        // The decode-side layout is normalized from the raw channel count
        // the same way the request side is: mono for one channel, stereo for
        // everything else. Multichannel sources lose their true layout here
        // on purpose; see the module docs in `transcode`.
        let decode_layout = channel_layout(decoder.channels().into());

        let input_time_base = stream.time_base();
        let decode_time_base = if is_valid(decoder.time_base()) {
            decoder.time_base()
        } else {
            Rational::new(1, decoder.rate() as i32)
        };

        debug!(
            stream_index = stream.index(),
            codec = ?codec_id,
            rate = decoder.rate(),
            channels = decoder.channels(),
            layout = ?decode_layout,
            input_time_base = %input_time_base,
            decode_time_base = %decode_time_base,
            "Opened audio decoder"
        );

        decoded.push(DecodedStream {
            stream_index: stream.index(),
            decoder,
            decode_layout,
            input_time_base,
            decode_time_base,
        });
    }

    if decoded.is_empty() {
        return Err(TranscodeError::NoAudioStream);
    }
    Ok((ictx, decoded))
}

fn is_valid(time_base: Rational) -> bool {
    time_base.numerator() > 0 && time_base.denominator() > 0
}
