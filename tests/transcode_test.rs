use std::fs;
use std::path::{Path, PathBuf};

use audio_transcode::{run_transcode, TranscodeError, TranscodeRequest};
use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, format, frame, ChannelLayout, Packet, Rational};

/// Write a PCM s16le WAV file containing `seconds` of a 440 Hz tone.
fn write_wav_fixture(path: &Path, channels: u16, sample_rate: u32, seconds: u32) {
    let frames = sample_rate * seconds;
    let block_align = channels as u32 * 2;
    let data_len = frames * block_align;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * block_align).to_le_bytes());
    bytes.extend_from_slice(&(block_align as u16).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    for frame in 0..frames {
        let t = frame as f64 / sample_rate as f64;
        let sample = ((t * 440.0 * 2.0 * std::f64::consts::PI).sin() * 8000.0) as i16;
        for _ in 0..channels {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }

    fs::write(path, bytes).expect("write fixture");
}

struct WavInfo {
    channels: u16,
    sample_rate: u32,
    data_len: u32,
}

/// Minimal RIFF chunk walk, enough to check what the service produced.
fn parse_wav(bytes: &[u8]) -> WavInfo {
    assert_eq!(&bytes[0..4], b"RIFF", "not a RIFF file");
    assert_eq!(&bytes[8..12], b"WAVE", "not a WAVE file");

    let mut channels = 0u16;
    let mut sample_rate = 0u32;
    let mut data_len = 0u32;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let len = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        match id {
            b"fmt " => {
                channels = u16::from_le_bytes(bytes[offset + 10..offset + 12].try_into().unwrap());
                sample_rate =
                    u32::from_le_bytes(bytes[offset + 12..offset + 16].try_into().unwrap());
            }
            b"data" => {
                // Muxers that cannot seek back may leave the size as -1; fall
                // back to whatever actually follows the header.
                data_len = if len == u32::MAX {
                    (bytes.len() - offset - 8) as u32
                } else {
                    len
                };
            }
            _ => {}
        }
        offset += 8 + len as usize + (len as usize & 1);
        if id == b"data" {
            break;
        }
    }

    WavInfo {
        channels,
        sample_rate,
        data_len,
    }
}

/// Encode a one second AVI fixture with a 16x16 raw video stream and,
/// optionally, a mono PCM audio stream.
fn write_avi_fixture(path: &Path, with_audio: bool) {
    let mut octx = format::output(&path).expect("open fixture output");

    let vcodec = codec::encoder::find_by_name("rawvideo").expect("rawvideo encoder");
    let mut video = codec::Context::new_with_codec(vcodec)
        .encoder()
        .video()
        .expect("video encoder");
    video.set_width(16);
    video.set_height(16);
    video.set_format(format::Pixel::YUV420P);
    video.set_time_base(Rational::new(1, 25));
    let mut video = video.open_as(vcodec).expect("open video encoder");
    let video_index = {
        let mut ost = octx.add_stream(vcodec.id()).expect("video stream");
        ost.set_parameters(&video);
        ost.set_time_base(video.time_base());
        ost.index()
    };

    let mut audio_parts = if with_audio {
        let acodec = codec::encoder::find_by_name("pcm_s16le").expect("pcm encoder");
        let mut audio = codec::Context::new_with_codec(acodec)
            .encoder()
            .audio()
            .expect("audio encoder");
        audio.set_rate(44_100);
        audio.set_channel_layout(ChannelLayout::MONO);
        audio.set_format(format::Sample::I16(format::sample::Type::Packed));
        audio.set_time_base(Rational::new(1, 44_100));
        let audio = audio.open_as(acodec).expect("open audio encoder");
        let index = {
            let mut ost = octx.add_stream(acodec.id()).expect("audio stream");
            ost.set_parameters(&audio);
            ost.set_time_base(audio.time_base());
            ost.index()
        };
        Some((audio, index))
    } else {
        None
    };

    octx.write_header().expect("write fixture header");

    let mut packet = Packet::empty();
    let mut mux = |packet: &mut Packet, index: usize, octx: &mut format::context::Output| {
        packet.set_stream(index);
        let stream_time_base = octx.stream(index).unwrap().time_base();
        packet.rescale_ts(
            if index == video_index {
                Rational::new(1, 25)
            } else {
                Rational::new(1, 44_100)
            },
            stream_time_base,
        );
        packet.write_interleaved(octx).expect("write fixture packet");
    };

    for pts in 0..25 {
        let mut vframe = frame::Video::new(format::Pixel::YUV420P, 16, 16);
        vframe.set_pts(Some(pts));
        video.send_frame(&vframe).expect("send video frame");
        while video.receive_packet(&mut packet).is_ok() {
            mux(&mut packet, video_index, &mut octx);
        }
    }
    video.send_eof().expect("flush video encoder");
    while video.receive_packet(&mut packet).is_ok() {
        mux(&mut packet, video_index, &mut octx);
    }

    if let Some((audio, index)) = audio_parts.as_mut() {
        for chunk in 0..10 {
            let mut aframe = frame::Audio::new(
                format::Sample::I16(format::sample::Type::Packed),
                4_410,
                ChannelLayout::MONO,
            );
            aframe.set_rate(44_100);
            aframe.set_pts(Some(chunk * 4_410));
            aframe.data_mut(0).fill(0);
            audio.send_frame(&aframe).expect("send audio frame");
            while audio.receive_packet(&mut packet).is_ok() {
                mux(&mut packet, *index, &mut octx);
            }
        }
        audio.send_eof().expect("flush audio encoder");
        while audio.receive_packet(&mut packet).is_ok() {
            mux(&mut packet, *index, &mut octx);
        }
    }

    octx.write_trailer().expect("write fixture trailer");
}

fn fixture_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("audio-transcode-{}-{}", std::process::id(), name))
}

#[test]
fn wav_mono_8k_to_stereo_44k_preserves_duration() {
    ffmpeg::init().unwrap();

    let source = fixture_path("mono8k.wav");
    let output = fixture_path("out-stereo44k.wav");
    write_wav_fixture(&source, 1, 8_000, 1);

    let request =
        TranscodeRequest::new(source.to_str().unwrap(), "wav", Some(2), Some(44_100)).unwrap();
    run_transcode(&request, &output).unwrap();

    let info = parse_wav(&fs::read(&output).unwrap());
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, 44_100);

    // One second of audio, allow a little resampler edge slack.
    let frames = info.data_len / (info.channels as u32 * 2);
    let expected = 44_100u32;
    assert!(
        frames.abs_diff(expected) <= 1_024,
        "expected about {expected} frames, got {frames}"
    );

    let _ = fs::remove_file(&source);
    let _ = fs::remove_file(&output);
}

#[test]
fn wav_rate_below_floor_is_produced_at_default_rate() {
    ffmpeg::init().unwrap();

    let source = fixture_path("stereo44k.wav");
    let output = fixture_path("out-default-rate.wav");
    write_wav_fixture(&source, 2, 44_100, 1);

    // 8000 is below the accepted floor, the service substitutes 44100.
    let request =
        TranscodeRequest::new(source.to_str().unwrap(), "wav", Some(1), Some(8_000)).unwrap();
    run_transcode(&request, &output).unwrap();

    let info = parse_wav(&fs::read(&output).unwrap());
    assert_eq!(info.channels, 1);
    assert_eq!(info.sample_rate, 44_100);

    let _ = fs::remove_file(&source);
    let _ = fs::remove_file(&output);
}

#[test]
fn flush_delivers_resampler_tail() {
    ffmpeg::init().unwrap();

    let source = fixture_path("tail-source.wav");
    let output = fixture_path("out-tail.wav");
    write_wav_fixture(&source, 1, 44_100, 1);

    // Upsampling leaves a few dozen samples buffered inside the resampler.
    // Only the end-of-stream flush of the filter graph gets them out, so the
    // tolerance here is tighter than what a dropped tail would leave behind.
    let request =
        TranscodeRequest::new(source.to_str().unwrap(), "wav", Some(1), Some(48_000)).unwrap();
    run_transcode(&request, &output).unwrap();

    let info = parse_wav(&fs::read(&output).unwrap());
    assert_eq!(info.sample_rate, 48_000);
    let frames = info.data_len / (info.channels as u32 * 2);
    assert!(
        frames.abs_diff(48_000) <= 16,
        "expected about 48000 frames, got {frames}"
    );

    let _ = fs::remove_file(&source);
    let _ = fs::remove_file(&output);
}

#[test]
fn video_stream_is_discarded_when_audio_present() {
    ffmpeg::init().unwrap();

    let source = fixture_path("mixed.avi");
    let output = fixture_path("out-from-mixed.wav");
    write_avi_fixture(&source, true);

    let request =
        TranscodeRequest::new(source.to_str().unwrap(), "wav", Some(2), Some(44_100)).unwrap();
    run_transcode(&request, &output).unwrap();

    let info = parse_wav(&fs::read(&output).unwrap());
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, 44_100);
    let frames = info.data_len / (info.channels as u32 * 2);
    assert!(
        frames.abs_diff(44_100) <= 1_024,
        "expected about one second of audio, got {frames} frames"
    );

    let _ = fs::remove_file(&source);
    let _ = fs::remove_file(&output);
}

#[test]
fn video_only_source_reports_no_audio() {
    ffmpeg::init().unwrap();

    let source = fixture_path("video-only.avi");
    let output = fixture_path("out-from-video-only.wav");
    write_avi_fixture(&source, false);

    let request =
        TranscodeRequest::new(source.to_str().unwrap(), "wav", None, None).unwrap();
    let error = run_transcode(&request, &output).unwrap_err();
    assert!(matches!(error, TranscodeError::NoAudioStream));
    assert!(!output.exists());

    let _ = fs::remove_file(&source);
}

#[test]
fn raw_target_writes_bare_samples() {
    ffmpeg::init().unwrap();

    let source = fixture_path("for-raw.wav");
    let output = fixture_path("out.raw");
    write_wav_fixture(&source, 2, 44_100, 1);

    let request =
        TranscodeRequest::new(source.to_str().unwrap(), "raw", Some(2), Some(44_100)).unwrap();
    run_transcode(&request, &output).unwrap();

    let bytes = fs::read(&output).unwrap();
    assert!(!bytes.is_empty());
    assert_ne!(&bytes[0..4], b"RIFF", "raw output must not carry a header");

    // Same rate and layout in and out, so the sample count should match the
    // fixture almost exactly.
    let expected = 44_100usize * 2 * 2;
    assert!(
        bytes.len().abs_diff(expected) <= 4_096,
        "expected about {expected} bytes, got {}",
        bytes.len()
    );

    let _ = fs::remove_file(&source);
    let _ = fs::remove_file(&output);
}

#[test]
fn unreadable_source_fails_at_open() {
    ffmpeg::init().unwrap();

    let output = fixture_path("never-written.wav");
    let request =
        TranscodeRequest::new("/nonexistent/input.wav", "wav", None, None).unwrap();
    let error = run_transcode(&request, &output).unwrap_err();
    assert!(matches!(error, TranscodeError::OpenInput { .. }));
    assert!(!output.exists());
}

#[test]
fn concurrent_requests_do_not_interfere() {
    ffmpeg::init().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                let source = fixture_path(&format!("concurrent-{i}.wav"));
                let output = fixture_path(&format!("concurrent-out-{i}.wav"));
                write_wav_fixture(&source, 1, 16_000, 1);

                let request =
                    TranscodeRequest::new(source.to_str().unwrap(), "wav", Some(2), Some(48_000))
                        .unwrap();
                run_transcode(&request, &output).unwrap();

                let info = parse_wav(&fs::read(&output).unwrap());
                assert_eq!(info.channels, 2);
                assert_eq!(info.sample_rate, 48_000);

                let _ = fs::remove_file(&source);
                let _ = fs::remove_file(&output);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
