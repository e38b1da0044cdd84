//! Mux-then-demux round trips for every supported container.

use std::sync::Arc;

use muxforge_common::{
    AudioConfig, Codec, EncodedPacket, PcmFormat, TrackId, TrackType, VideoConfig,
};
use muxforge_io::{BufferSource, FileSource, FileTarget, Source};
use muxforge_media::flac::{crc16_update, crc8, write_utf8_number};
use muxforge_media::{Demuxer, InputFormat, Muxer, OutputFormat};

/// Demux every packet of `track` from `bytes`.
async fn read_all(bytes: impl Into<bytes::Bytes>, track: TrackId) -> Vec<EncodedPacket> {
    let mut demuxer = Demuxer::new(Arc::new(BufferSource::new(bytes.into())));
    let mut packets = Vec::new();
    while let Some(packet) = demuxer.read_packet(track).await.unwrap() {
        packets.push(packet);
    }
    packets
}

/// A 4096-sample, 44.1 kHz stereo FLAC frame with valid CRCs.
fn flac_frame(number: u64, payload_len: usize) -> Vec<u8> {
    let mut out = vec![0xFF, 0xF8, 0xC9, 0x18];
    write_utf8_number(number, &mut out);
    out.push(crc8(&out));
    out.extend((0..payload_len).map(|i| ((i * 7 + number as usize) % 0x7F) as u8));
    let crc = crc16_update(0, &out);
    out.extend_from_slice(&crc.to_be_bytes());
    out
}

#[tokio::test]
async fn test_adts_round_trip() {
    let muxer = Muxer::new(OutputFormat::Adts, None);
    let id = muxer
        .add_audio_track(AudioConfig::new(Codec::Aac, 48000, 2))
        .await
        .unwrap();

    let payloads: Vec<Vec<u8>> = (0..5u8).map(|n| vec![n; 50 + n as usize * 10]).collect();
    for (n, payload) in payloads.iter().enumerate() {
        let ts = n as f64 * 1024.0 / 48000.0;
        muxer
            .write_packet(EncodedPacket::new(id, payload.clone(), ts))
            .await
            .unwrap();
    }
    let out = muxer.finalize().await.unwrap();

    let mut demuxer = Demuxer::new(Arc::new(BufferSource::new(out.clone())));
    let tracks = demuxer.tracks().await.unwrap().to_vec();
    assert_eq!(demuxer.format(), Some(InputFormat::Adts));
    assert_eq!(tracks.len(), 1);
    let audio = tracks[0].audio().unwrap();
    assert_eq!(audio.codec, Codec::Aac);
    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);

    let packets = read_all(out, tracks[0].id).await;
    assert_eq!(packets.len(), 5);
    for (n, (packet, payload)) in packets.iter().zip(&payloads).enumerate() {
        assert_eq!(packet.data.as_ref(), payload.as_slice());
        assert!((packet.timestamp - n as f64 * 1024.0 / 48000.0).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_mp3_round_trip() {
    // MPEG-1 layer III, 128 kbit/s, 44.1 kHz: 417-byte frames.
    let frames: Vec<Vec<u8>> = (0..4u8)
        .map(|n| {
            let mut frame = vec![0xFF, 0xFB, 0x90, 0x44];
            frame.resize(417, n);
            frame
        })
        .collect();

    let muxer = Muxer::new(OutputFormat::Mp3, None);
    let id = muxer
        .add_audio_track(AudioConfig::new(Codec::Mp3, 44100, 2))
        .await
        .unwrap();
    for (n, frame) in frames.iter().enumerate() {
        let ts = n as f64 * 1152.0 / 44100.0;
        muxer
            .write_packet(EncodedPacket::new(id, frame.clone(), ts))
            .await
            .unwrap();
    }
    let out = muxer.finalize().await.unwrap();
    assert_eq!(out.len(), 4 * 417);

    let packets = read_all(out, TrackId::new(1)).await;
    assert_eq!(packets.len(), 4);
    for (packet, frame) in packets.iter().zip(&frames) {
        assert_eq!(packet.data.as_ref(), frame.as_slice());
    }
    assert!((packets[3].timestamp - 3.0 * 1152.0 / 44100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_flac_round_trip() {
    let frames: Vec<Vec<u8>> = (0..3).map(|n| flac_frame(n, 200 + n as usize * 50)).collect();

    let muxer = Muxer::new(OutputFormat::Flac, None);
    let id = muxer
        .add_audio_track(AudioConfig::new(Codec::Flac, 44100, 2).with_bits_per_sample(16))
        .await
        .unwrap();
    for (n, frame) in frames.iter().enumerate() {
        let ts = n as f64 * 4096.0 / 44100.0;
        muxer
            .write_packet(EncodedPacket::new(id, frame.clone(), ts))
            .await
            .unwrap();
    }
    let out = muxer.finalize().await.unwrap();

    let mut demuxer = Demuxer::new(Arc::new(BufferSource::new(out.clone())));
    let tracks = demuxer.tracks().await.unwrap().to_vec();
    let audio = tracks[0].audio().unwrap();
    assert_eq!(audio.codec, Codec::Flac);
    assert_eq!(audio.bits_per_sample, Some(16));
    let duration = demuxer.duration().await.unwrap().unwrap();
    assert!((duration - 3.0 * 4096.0 / 44100.0).abs() < 1e-9);

    let packets = read_all(out, id).await;
    assert_eq!(packets.len(), 3);
    for (packet, frame) in packets.iter().zip(&frames) {
        assert_eq!(packet.data.as_ref(), frame.as_slice());
    }
}

#[tokio::test]
async fn test_wav_round_trip() {
    let muxer = Muxer::new(OutputFormat::Wav, None);
    let id = muxer
        .add_audio_track(AudioConfig::new(Codec::Pcm(PcmFormat::S16Le), 8000, 2))
        .await
        .unwrap();

    // 2048 stereo 16-bit frames in two writes.
    let samples: Vec<u8> = (0..2048 * 4).map(|i| (i % 251) as u8).collect();
    muxer
        .write_packet(EncodedPacket::new(id, samples[..4096].to_vec(), 0.0))
        .await
        .unwrap();
    muxer
        .write_packet(EncodedPacket::new(id, samples[4096..].to_vec(), 0.128))
        .await
        .unwrap();
    let out = muxer.finalize().await.unwrap();
    assert_eq!(&out[4..8], &(out.len() as u32 - 8).to_le_bytes());

    let mut demuxer = Demuxer::new(Arc::new(BufferSource::new(out.clone())));
    let tracks = demuxer.tracks().await.unwrap().to_vec();
    let audio = tracks[0].audio().unwrap();
    assert_eq!(audio.codec, Codec::Pcm(PcmFormat::S16Le));
    assert_eq!(audio.channels, 2);
    assert_eq!(demuxer.duration().await.unwrap(), Some(0.256));

    let packets = read_all(out, id).await;
    assert_eq!(packets.len(), 2);
    let joined: Vec<u8> = packets.iter().flat_map(|p| p.data.iter().copied()).collect();
    assert_eq!(joined, samples);
    assert_eq!(packets[1].timestamp, 0.128);
}

#[tokio::test]
async fn test_webm_round_trip() {
    let muxer = Muxer::new(OutputFormat::Webm, None);
    let video = muxer
        .add_video_track(VideoConfig::new(Codec::Vp9, 640, 360))
        .await
        .unwrap();
    let audio = muxer
        .add_audio_track(AudioConfig::new(Codec::Opus, 48000, 2))
        .await
        .unwrap();

    for n in 0..6u8 {
        let ts = n as f64 * 0.04;
        muxer
            .write_packet(
                EncodedPacket::new(video, vec![0x10 + n; 30], ts).with_keyframe(n % 3 == 0),
            )
            .await
            .unwrap();
        muxer
            .write_packet(EncodedPacket::new(audio, vec![0x20 + n; 12], ts).with_keyframe(true))
            .await
            .unwrap();
    }
    let out = muxer.finalize().await.unwrap();

    let mut demuxer = Demuxer::new(Arc::new(BufferSource::new(out.clone())));
    assert_eq!(demuxer.format(), None);
    let tracks = demuxer.tracks().await.unwrap().to_vec();
    assert_eq!(demuxer.format(), Some(InputFormat::Matroska));
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].track_type(), TrackType::Video);
    assert_eq!(tracks[0].video().unwrap().width, 640);
    assert_eq!(tracks[1].codec(), &Codec::Opus);

    let packets = read_all(out.clone(), video).await;
    assert_eq!(packets.len(), 6);
    for (n, packet) in packets.iter().enumerate() {
        assert_eq!(packet.data.as_ref(), vec![0x10 + n as u8; 30].as_slice());
        assert!((packet.timestamp - n as f64 * 0.04).abs() < 0.001);
        assert_eq!(packet.is_keyframe, n % 3 == 0);
    }
    let packets = read_all(out, audio).await;
    assert_eq!(packets.len(), 6);
    assert_eq!(packets[5].data.as_ref(), &[0x25; 12]);
}

#[tokio::test]
async fn test_file_backed_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");

    let target = FileTarget::create(&path).await.unwrap();
    let muxer = Muxer::new(OutputFormat::Wav, Some(Box::new(target)));
    let id = muxer
        .add_audio_track(AudioConfig::new(Codec::Pcm(PcmFormat::U8), 8000, 1))
        .await
        .unwrap();
    muxer
        .write_packet(EncodedPacket::new(id, vec![0x80; 3000], 0.0))
        .await
        .unwrap();
    let out = muxer.finalize().await.unwrap();
    assert!(out.is_empty());
    muxer.close().await.unwrap();

    let source = FileSource::open(&path).await.unwrap();
    assert_eq!(source.size().await.unwrap(), Some(44 + 3000));

    let mut demuxer = Demuxer::new(Arc::new(source));
    assert_eq!(demuxer.duration().await.unwrap(), Some(0.375));
    let frames = demuxer.frame_table().await.unwrap();
    assert_eq!(frames.len(), 3);
    demuxer.close().await.unwrap();
}
