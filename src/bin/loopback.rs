//! Loopback Streaming Demo
//!
//! Encodes a sine sweep, streams it across an in-memory fabric with two
//! receiving endpoints, reassembles and decodes it, and prints the debug
//! reports along the way.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_replicator::{
    codec::OpusAdapter,
    config::StreamConfig,
    framing,
    identity::{EndpointId, ParticipantId},
    network::LocalFabric,
    registry::{Attachment, ListenerHandle, SessionRegistry},
    replicator::Replicator,
    report::EncodeSummary,
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting loopback streaming demo");

    let config = StreamConfig::default().normalized()?;
    let frame_size = config.frame_size_per_channel();

    // Two seconds of 440 Hz sine, plus a tail that cannot fill a frame.
    let total_samples = config.sample_rate as usize * 2 + 123;
    let pcm: Vec<i16> = (0..total_samples)
        .map(|i| {
            let t = i as f32 / config.sample_rate as f32;
            ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 12_000.0) as i16
        })
        .collect();

    // Encode
    let mut adapter = OpusAdapter::new(config.sample_rate, config.channels, config.bitrate)?;
    let packets = adapter.encode_pcm16(&pcm, frame_size)?;
    let packed = framing::pack(&packets);
    tracing::info!(
        packets = packets.len(),
        packed_bytes = packed.len(),
        "encode finished"
    );

    println!(
        "{}",
        EncodeSummary {
            sample_rate: config.sample_rate,
            channels: config.channels,
            frame_ms: config.frame_ms,
            bitrate: config.bitrate,
            pcm_samples: pcm.len(),
            decoded_samples: None,
            buffer_bytes: packed.len(),
            packet_count: packets.len(),
        }
    );

    // One sender and two receivers on the fabric.
    let endpoints = [EndpointId::new(1), EndpointId::new(2), EndpointId::new(3)];
    let mut fabric = LocalFabric::new();
    let mut replicators: Vec<Replicator> = endpoints
        .iter()
        .enumerate()
        .map(|(i, endpoint)| {
            fabric.join(*endpoint);
            Replicator::new(i == 0, &config)
        })
        .collect();

    let mut registry = SessionRegistry::new();
    let sender_owner = ParticipantId::new(1);
    for (i, replicator) in replicators.iter().enumerate() {
        let attachment = if i == 0 {
            Attachment::Participant(sender_owner)
        } else {
            Attachment::Detached
        };
        registry.register_replicator(replicator.id(), attachment);
    }

    // Start the broadcast and watch for its completion via the registry.
    let session = replicators[0].start_broadcast(packets.clone(), config.header(), None, &mut fabric)?;
    tracing::info!(session = %session, "broadcast started");

    let listener = ListenerHandle::new();
    registry.subscribe_session(session, &listener, |sender, session| {
        tracing::info!(sender = %sender, session = ?session, "session activity observed");
    });

    // Drive ticks until the fabric is idle and the sender has drained.
    let mut ticks = 0u32;
    loop {
        replicators[0].tick(&mut fabric);
        ticks += 1;

        let mut delivered = 0usize;
        for (i, endpoint) in endpoints.iter().enumerate() {
            for frame in fabric.drain(*endpoint) {
                delivered += 1;
                replicators[i].handle_frame(&frame, &mut registry);
            }
        }

        if delivered == 0 && replicators[0].active_outgoing() == 0 {
            break;
        }
    }
    tracing::info!(ticks, "fabric drained");

    // Inspect one receiver.
    let receiver = &replicators[1];
    let report = receiver
        .incoming_report(session)
        .context("receiver has no record of the session")?;
    println!("{report}");

    let incoming = receiver
        .incoming(session)
        .context("receiver has no record of the session")?;
    anyhow::ensure!(incoming.ready_to_assemble(), "transfer incomplete");

    let (header, received) = receiver
        .received_packets(session)
        .context("no received packets")?;
    let mut decoder = OpusAdapter::new(header.sample_rate, header.channels, header.bitrate)?;
    let decoded = decoder.decode_packets(received)?;

    tracing::info!(
        sent_packets = packets.len(),
        received_packets = received.len(),
        decoded_samples = decoded.len(),
        "loopback round-trip complete"
    );
    Ok(())
}
