//! Per-stream pipeline state and the drain loops that move data through it.
//!
//! A stream moves through three stages before packets flow: decoder opened
//! ([`DecodedStream`]), encoder negotiated and output stream allocated
//! ([`NegotiatedStream`]), filter graph built ([`StreamPipeline`]). Each stage
//! consumes the previous one, so a half-initialized pipeline cannot receive
//! packets.

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, filter, format, frame, Packet, Rational};
use tracing::trace;

use super::error::TranscodeError;

/// Outcome of receiving from a decoder, filter sink or encoder. Only fatal
/// errors escape as `Err`; these three are the expected control flow of a
/// drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    /// A frame or packet came out; keep draining.
    Received,
    /// The component wants more input before it can produce again.
    NeedsInput,
    /// The component was flushed and has nothing left.
    Exhausted,
}

fn drain(result: Result<(), ffmpeg::Error>) -> Result<Drain, ffmpeg::Error> {
    match result {
        Ok(()) => Ok(Drain::Received),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
            Ok(Drain::NeedsInput)
        }
        Err(ffmpeg::Error::Eof) => Ok(Drain::Exhausted),
        Err(e) => Err(e),
    }
}

/// An input stream with its decoder opened. Produced by input probing,
/// consumed by output negotiation.
pub struct DecodedStream {
    pub stream_index: usize,
    pub decoder: codec::decoder::Audio,
    /// Mono/stereo layout normalized from the decoder's raw channel count;
    /// multichannel layouts are not carried through.
    pub decode_layout: ffmpeg::ChannelLayout,
    /// Time base of the packets as demuxed.
    pub input_time_base: Rational,
    /// Time base packets are rescaled to before entering the decoder.
    pub decode_time_base: Rational,
}

/// A stream with an opened encoder and an allocated output stream, waiting
/// for its filter graph.
pub struct NegotiatedStream {
    pub stream_index: usize,
    pub decoder: codec::decoder::Audio,
    pub decode_layout: ffmpeg::ChannelLayout,
    pub encoder: codec::encoder::audio::Encoder,
    pub input_time_base: Rational,
    pub decode_time_base: Rational,
    /// Index of the stream in the output container.
    pub output_index: usize,
}

/// A fully wired stream: decoder, conversion graph and encoder, plus the
/// reusable frame and packet buffers the drain loops fill.
pub struct StreamPipeline {
    decoder: codec::decoder::Audio,
    encoder: codec::encoder::audio::Encoder,
    graph: filter::Graph,
    input_time_base: Rational,
    decode_time_base: Rational,
    output_index: usize,
    decode_frame: frame::Audio,
    encode_packet: Packet,
}

impl StreamPipeline {
    pub fn new(stream: NegotiatedStream, graph: filter::Graph) -> Self {
        Self {
            decoder: stream.decoder,
            encoder: stream.encoder,
            graph,
            input_time_base: stream.input_time_base,
            decode_time_base: stream.decode_time_base,
            output_index: stream.output_index,
            decode_frame: frame::Audio::empty(),
            encode_packet: Packet::empty(),
        }
    }

    /// Feed one demuxed packet and drain everything it produces all the way
    /// to the output container.
    pub fn feed_packet(
        &mut self,
        packet: &mut Packet,
        octx: &mut format::context::Output,
    ) -> Result<(), TranscodeError> {
        packet.rescale_ts(self.input_time_base, self.decode_time_base);
        self.decoder
            .send_packet(packet)
            .map_err(TranscodeError::Decode)?;
        self.drain_decoder(octx)
    }

    fn drain_decoder(&mut self, octx: &mut format::context::Output) -> Result<(), TranscodeError> {
        loop {
            match drain(self.decoder.receive_frame(&mut self.decode_frame))
                .map_err(TranscodeError::Decode)?
            {
                Drain::Received => {
                    let timestamp = self.decode_frame.timestamp();
                    self.decode_frame.set_pts(timestamp);
                    filter_encode_write(
                        &mut self.graph,
                        &mut self.encoder,
                        &mut self.encode_packet,
                        self.output_index,
                        octx,
                        Some(&self.decode_frame),
                    )?;
                }
                Drain::NeedsInput | Drain::Exhausted => return Ok(()),
            }
        }
    }

    /// End-of-stream protocol. Order matters: the decoder is drained first so
    /// its buffered frames reach the filter, the filter is flushed before the
    /// encoder so resampler tail samples reach the encoder, and only then is
    /// the encoder itself flushed.
    pub fn flush(&mut self, octx: &mut format::context::Output) -> Result<(), TranscodeError> {
        trace!(output_index = self.output_index, "Flushing pipeline");
        self.decoder.send_eof().map_err(TranscodeError::Decode)?;
        self.drain_decoder(octx)?;

        filter_encode_write(
            &mut self.graph,
            &mut self.encoder,
            &mut self.encode_packet,
            self.output_index,
            octx,
            None,
        )?;

        encode_write(
            &mut self.encoder,
            &mut self.encode_packet,
            self.output_index,
            octx,
            None,
        )
    }
}

/// Push a frame into the filter graph (or flush it when `frame` is `None`)
/// and drain every filtered frame through the encoder into the output.
fn filter_encode_write(
    graph: &mut filter::Graph,
    encoder: &mut codec::encoder::audio::Encoder,
    encode_packet: &mut Packet,
    output_index: usize,
    octx: &mut format::context::Output,
    frame: Option<&frame::Audio>,
) -> Result<(), TranscodeError> {
    {
        let mut ctx = graph
            .get("in")
            .ok_or(TranscodeError::Filter(ffmpeg::Error::FilterNotFound))?;
        let mut source = ctx.source();
        match frame {
            Some(frame) => source.add(frame).map_err(TranscodeError::Filter)?,
            None => source.flush().map_err(TranscodeError::Filter)?,
        }
    }

    loop {
        let mut filtered = frame::Audio::empty();
        let status = {
            let mut ctx = graph
                .get("out")
                .ok_or(TranscodeError::Filter(ffmpeg::Error::FilterNotFound))?;
            let mut sink = ctx.sink();
            drain(sink.frame(&mut filtered)).map_err(TranscodeError::Filter)?
        };
        match status {
            Drain::Received => {
                let timestamp = filtered.timestamp();
                filtered.set_pts(timestamp);
                encode_write(encoder, encode_packet, output_index, octx, Some(&filtered))?;
            }
            Drain::NeedsInput | Drain::Exhausted => return Ok(()),
        }
    }
}

/// Push a frame into the encoder (or flush it when `frame` is `None`) and
/// write every produced packet, rescaled to the output stream's time base.
fn encode_write(
    encoder: &mut codec::encoder::audio::Encoder,
    encode_packet: &mut Packet,
    output_index: usize,
    octx: &mut format::context::Output,
    frame: Option<&frame::Audio>,
) -> Result<(), TranscodeError> {
    match frame {
        Some(frame) => encoder.send_frame(frame).map_err(TranscodeError::Encode)?,
        None => encoder.send_eof().map_err(TranscodeError::Encode)?,
    }

    loop {
        match drain(encoder.receive_packet(encode_packet)).map_err(TranscodeError::Encode)? {
            Drain::Received => {
                encode_packet.set_stream(output_index);
                let stream_time_base = octx
                    .stream(output_index)
                    .map(|s| s.time_base())
                    .unwrap_or_else(|| encoder.time_base());
                encode_packet.rescale_ts(encoder.time_base(), stream_time_base);
                encode_packet
                    .write_interleaved(octx)
                    .map_err(TranscodeError::WritePacket)?;
            }
            Drain::NeedsInput | Drain::Exhausted => return Ok(()),
        }
    }
}
