use crate::channel::{open_streams, CloseHandle, MessageRx, MessageTx};
use crate::config::TransportConfig;
use crate::error::{ParseError, TransportError};
use crate::k12::{Direction, K12Monitor};
use crate::mbuf::{Mbuf, MbufPool};
use crate::rx::rx_loop;
use crate::stats::{StatsSnapshot, VethStats};
use crate::wire::{parse_batch, BatchWriter, MAX_BATCH_BYTES, MAX_BATCH_PACKETS, MAX_FRAME_LEN};
use crossbeam::channel::{bounded, Receiver};
use emu_core::client::{AddressFamily, Client, ClientTransport};
use emu_core::processor::{Processor, TaggedFrame, TunnelRewrite};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Binds a client to the virtual port its frames leave on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VethPort {
    pub vport: u16,
}

impl VethPort {
    pub fn new(vport: u16) -> Self {
        VethPort { vport }
    }
}

impl ClientTransport for VethPort {
    fn name(&self) -> &str {
        "veth"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Where [`FrameTransport::send_buffer`] sends a frame.
#[derive(Clone, Copy)]
pub enum Route<'a> {
    /// The frame goes out as is on `vport`.
    Broadcast { vport: u16 },
    /// The frame is addressed to `client`'s gateway for `family` and leaves on the client's
    /// [`VethPort`].
    Unicast {
        client: &'a Client,
        family: AddressFamily,
    },
}

/// Receives every frame taken off the wire. The handler owns the buffer from then on.
pub trait RxHandler: Send {
    fn handle(&mut self, frame: Mbuf);
}

impl<F: FnMut(Mbuf) + Send> RxHandler for F {
    fn handle(&mut self, frame: Mbuf) {
        self(frame)
    }
}

/// Moves frames between the emulator and the packet I/O process.
///
/// Outbound frames collect in a pending batch that is written as one message once it holds
/// [`MAX_BATCH_PACKETS`] frames, before it would reach [`MAX_BATCH_BYTES`], or on an explicit
/// [`flush`](FrameTransport::flush). Inbound messages are read by a background worker and
/// queued whole; the owning thread parses and dispatches them with
/// [`poll_rx`](FrameTransport::poll_rx) or [`recv_timeout`](FrameTransport::recv_timeout).
///
/// Everything except the worker runs on the caller's thread.
pub struct FrameTransport {
    config: TransportConfig,
    tx: Box<dyn MessageTx>,
    rx: Option<Box<dyn MessageRx>>,
    pool: Arc<dyn MbufPool>,
    pending: Vec<Mbuf>,
    pending_bytes: usize,
    writer: BatchWriter,
    stats: Arc<VethStats>,
    queue: Option<Receiver<Vec<u8>>>,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    closer: Option<CloseHandle>,
    handler: Option<Box<dyn RxHandler>>,
    proxy_handler: Option<Box<dyn RxHandler>>,
    rewrite: Option<TunnelRewrite>,
    monitor: Option<K12Monitor>,
    closed: bool,
}

impl FrameTransport {
    pub fn new(
        config: TransportConfig,
        tx: Box<dyn MessageTx>,
        rx: Box<dyn MessageRx>,
        pool: Arc<dyn MbufPool>,
    ) -> Self {
        FrameTransport {
            config,
            tx,
            rx: Some(rx),
            pool,
            pending: Vec::with_capacity(MAX_BATCH_PACKETS),
            pending_bytes: 0,
            writer: BatchWriter::new(),
            stats: Arc::new(VethStats::new()),
            queue: None,
            worker: None,
            stop: Arc::new(AtomicBool::new(false)),
            closer: None,
            handler: None,
            proxy_handler: None,
            rewrite: None,
            monitor: None,
            closed: false,
        }
    }

    /// Opens the socket pair `config` describes.
    pub fn create(config: TransportConfig, pool: Arc<dyn MbufPool>) -> Result<Self, TransportError> {
        let endpoints = config.endpoints()?;
        let (tx, rx) = open_streams(&endpoints)?;
        info!(
            rx = %endpoints.rx,
            tx = %endpoints.tx,
            proxy = config.proxy_mode,
            rewrite = config.tunnel_rewrite,
            "transport open"
        );
        Ok(FrameTransport::new(config, Box::new(tx), Box::new(rx), pool))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<dyn MbufPool> {
        &self.pool
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn set_handler(&mut self, handler: impl RxHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Receives inbound frames instead of the default handler while in proxy mode.
    pub fn set_proxy_handler(&mut self, handler: impl RxHandler + 'static) {
        self.proxy_handler = Some(Box::new(handler));
    }

    /// Installs the rewrite applied to inbound frames when rewriting is enabled in the
    /// config. Without it, rewriting is off regardless of the config.
    pub fn with_tunnel_rewrite(mut self, rewrite: TunnelRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    pub fn set_monitor(&mut self, monitor: K12Monitor) {
        self.monitor = Some(monitor);
    }

    /// Frames waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Starts the background receive worker.
    pub fn start_rx(&mut self) -> Result<(), TransportError> {
        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => return Err(TransportError::AlreadyStarted),
        };
        let (queue_tx, queue_rx) = bounded(self.config.rx_queue_depth);
        let closer = rx.close_handle();
        let stop = Arc::clone(&self.stop);
        let stats = Arc::clone(&self.stats);
        let backoff = self.config.rx_retry_backoff;
        let worker = thread::Builder::new()
            .name(format!("emu-rx-{}", self.config.port))
            .spawn(move || rx_loop(rx, queue_tx, stop, stats, backoff))
            .map_err(TransportError::Spawn)?;
        self.queue = Some(queue_rx);
        self.closer = Some(closer);
        self.worker = Some(worker);
        Ok(())
    }

    /// Queues one frame, flushing around it as the batch limits require. Frames too long for
    /// the wire are dropped and counted.
    pub fn send(&mut self, frame: Mbuf) {
        let len = frame.pkt_len();
        if len > MAX_FRAME_LEN {
            VethStats::inc(&self.stats.tx_drop_invalid);
            debug!(len, "frame too long for the wire");
            self.pool.free(frame);
            return;
        }
        VethStats::inc(&self.stats.tx_pkts);
        VethStats::add(&self.stats.tx_bytes, len as u64);

        if !self.pending.is_empty() && self.pending_bytes + len >= MAX_BATCH_BYTES {
            self.flush();
        }
        let frame = if frame.is_contiguous() {
            frame
        } else {
            let copy = self.pool.contiguous(&frame);
            self.pool.free(frame);
            copy
        };
        self.pending_bytes += len;
        self.pending.push(frame);
        if self.pending.len() >= MAX_BATCH_PACKETS {
            self.flush();
        }
    }

    /// Writes the pending batch as one message and returns its frames to the pool.
    ///
    /// # Panics
    ///
    /// Panics if a pending frame is not contiguous.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.writer.clear();
        for frame in self.pending.drain(..) {
            dump(&mut self.monitor, Direction::Tx, &frame);
            self.writer.push(frame.vport(), frame.data());
            self.pool.free(frame);
        }
        self.pending_bytes = 0;
        VethStats::inc(&self.stats.tx_batch);

        let count = self.writer.count();
        if let Err(e) = self.tx.send_msg(self.writer.finish()) {
            VethStats::inc(&self.stats.tx_channel_err);
            warn!(error = %e, count, "batch lost");
            return;
        }
        trace!(count, "flushed batch");
    }

    /// Sends `frame` along `route`. Unicast frames get the gateway MAC as destination and
    /// the client MAC as source; while the gateway is unresolved they are dropped and
    /// counted.
    pub fn send_buffer(&mut self, route: Route<'_>, mut frame: Mbuf) {
        let (client, family) = match route {
            Route::Broadcast { vport } => {
                frame.set_vport(vport);
                self.send(frame);
                return;
            }
            Route::Unicast { client, family } => (client, family),
        };

        let vport = match client.transport::<VethPort>() {
            Some(port) => port.vport,
            None => {
                debug!(mac = %client.mac(), "client has no virtual port");
                return self.drop_invalid(frame);
            }
        };
        let gateway = match client.resolver().gateway_mac(family) {
            Some(mac) => mac,
            None => {
                VethStats::inc(&self.stats.tx_drop_not_resolved);
                trace!(mac = %client.mac(), ?family, "gateway not resolved");
                self.pool.free(frame);
                return;
            }
        };
        if frame.pkt_len() < 12 {
            return self.drop_invalid(frame);
        }
        if !frame.is_contiguous() {
            let copy = self.pool.contiguous(&frame);
            self.pool.free(frame);
            frame = copy;
        }
        let data = frame.data_mut();
        data[..6].copy_from_slice(&gateway.bytes);
        data[6..12].copy_from_slice(&client.mac().bytes);
        frame.set_vport(vport);
        self.send(frame);
    }

    fn drop_invalid(&mut self, frame: Mbuf) {
        VethStats::inc(&self.stats.tx_drop_invalid);
        self.pool.free(frame);
    }

    /// Parses one inbound message and dispatches its frames. A malformed message is counted
    /// and delivers nothing.
    pub fn on_rx_message(&mut self, msg: &[u8]) -> Result<usize, ParseError> {
        VethStats::inc(&self.stats.rx_batch);
        let packets = match parse_batch(msg) {
            Ok(packets) => packets,
            Err(e) => {
                VethStats::inc(&self.stats.rx_parse_err);
                debug!(error = %e, len = msg.len(), "dropping malformed message");
                return Err(e);
            }
        };
        let count = packets.len();
        for packet in packets {
            let mut frame = self.pool.alloc(packet.data.len());
            frame.append(packet.data);
            frame.set_vport(u16::from(packet.vport));
            self.on_rx(frame);
        }
        Ok(count)
    }

    fn on_rx(&mut self, frame: Mbuf) {
        VethStats::inc(&self.stats.rx_pkts);
        VethStats::add(&self.stats.rx_bytes, frame.pkt_len() as u64);
        dump(&mut self.monitor, Direction::Rx, &frame);

        if self.config.tunnel_rewrite {
            if let Some(rewrite) = self.rewrite.as_mut() {
                let tagged = TaggedFrame::new(frame.vport(), frame.to_vec());
                self.pool.free(frame);
                match rewrite.process(tagged) {
                    Some(out) => {
                        VethStats::inc(&self.stats.rx_rewrite_fwd);
                        let mut fwd = self.pool.alloc(out.data.len());
                        fwd.append(&out.data);
                        self.send_buffer(Route::Broadcast { vport: out.vport }, fwd);
                    }
                    None => VethStats::inc(&self.stats.rx_rewrite_drop),
                }
                return;
            }
        }

        if self.config.proxy_mode {
            if let Some(handler) = self.proxy_handler.as_mut() {
                handler.handle(frame);
                return;
            }
        }
        match self.handler.as_mut() {
            Some(handler) => handler.handle(frame),
            None => self.pool.free(frame),
        }
    }

    /// Dispatches every message already queued, without blocking. Returns the number of
    /// messages taken.
    pub fn poll_rx(&mut self) -> usize {
        let mut taken = 0;
        while let Some(msg) = self.queue.as_ref().and_then(|q| q.try_recv().ok()) {
            let _ = self.on_rx_message(&msg);
            taken += 1;
        }
        taken
    }

    /// Waits up to `timeout` for a message, then dispatches it and whatever queued behind it.
    pub fn recv_timeout(&mut self, timeout: Duration) -> usize {
        let first = match &self.queue {
            Some(queue) => queue.recv_timeout(timeout).ok(),
            None => {
                thread::sleep(timeout);
                None
            }
        };
        match first {
            Some(msg) => {
                let _ = self.on_rx_message(&msg);
                1 + self.poll_rx()
            }
            None => 0,
        }
    }

    /// Tears the transport down: pending frames go back to the pool unsent, then the worker
    /// is stopped and joined. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let dropped = self.pending.len();
        for frame in self.pending.drain(..) {
            self.pool.free(frame);
        }
        self.pending_bytes = 0;
        if dropped > 0 {
            debug!(dropped, "released unsent frames");
        }

        self.stop.store(true, Ordering::Release);
        if let Some(closer) = self.closer.take() {
            closer.close();
        }
        self.rx = None;
        self.queue = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("receive worker panicked");
            }
        }
        debug!(port = self.config.port, "transport closed");
    }
}

impl Drop for FrameTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn dump(monitor: &mut Option<K12Monitor>, direction: Direction, frame: &Mbuf) {
    if let Some(monitor) = monitor {
        if let Err(e) = monitor.dump(direction, frame.vport(), &frame.to_vec()) {
            debug!(error = %e, "monitor write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, MemoryRx, MemoryTx};
    use crate::mbuf::HeapPool;
    use crate::wire::{BatchWriter, WirePacket};
    use emu_core::client::ClientConfig;
    use emu_core::state::TranslationTable;
    use emu_core::tunnel::{self, TunnelKey};
    use emu_core::utils::test::{frame_with_vlans, pattern_payload};
    use emu_packets::MacAddr;
    use std::sync::Mutex;

    struct Harness {
        transport: FrameTransport,
        pool: Arc<HeapPool>,
        /// What the transport wrote.
        wire_out: MemoryRx,
        /// Feeds the transport's receive side.
        wire_in: MemoryTx,
    }

    fn harness(config: TransportConfig) -> Harness {
        let (tx, wire_out) = channel::channel();
        let (wire_in, rx) = channel::channel();
        let pool = Arc::new(HeapPool::new());
        let transport = FrameTransport::new(config, Box::new(tx), Box::new(rx), pool.clone());
        Harness {
            transport,
            pool,
            wire_out,
            wire_in,
        }
    }

    fn mbuf(pool: &HeapPool, vport: u16, data: &[u8]) -> Mbuf {
        let mut m = pool.alloc(data.len());
        m.append(data);
        m.set_vport(vport);
        m
    }

    fn batch(packets: &[(u16, &[u8])]) -> Vec<u8> {
        let mut writer = BatchWriter::new();
        for (vport, data) in packets {
            writer.push(*vport, data);
        }
        writer.finish().to_vec()
    }

    fn collector(pool: Arc<HeapPool>) -> (impl RxHandler, Arc<Mutex<Vec<(u16, Vec<u8>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let handler = move |m: Mbuf| {
            log.lock().unwrap().push((m.vport(), m.to_vec()));
            pool.free(m);
        };
        (handler, seen)
    }

    #[test]
    fn sixty_fifth_frame_starts_a_new_batch() {
        let mut h = harness(TransportConfig::new(4000));
        let payload = pattern_payload(100);
        for _ in 0..65 {
            h.transport.send(mbuf(&h.pool, 1, &payload));
        }
        assert_eq!(h.transport.pending(), 1);
        h.transport.flush();

        let first = h.wire_out.recv_msg().unwrap();
        let second = h.wire_out.recv_msg().unwrap();
        let first = parse_batch(&first).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.iter().all(|p| p.vport == 1 && p.data == &payload[..]));
        assert_eq!(parse_batch(&second).unwrap().len(), 1);

        let stats = h.transport.stats();
        assert_eq!(stats.tx_pkts, 65);
        assert_eq!(stats.tx_bytes, 6500);
        assert_eq!(stats.tx_batch, 2);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn byte_ceiling_flushes_first() {
        let mut h = harness(TransportConfig::new(4000));
        let payload = pattern_payload(1000);
        for _ in 0..33 {
            h.transport.send(mbuf(&h.pool, 0, &payload));
        }
        let msg = h.wire_out.recv_msg().unwrap();
        assert_eq!(parse_batch(&msg).unwrap().len(), 32);
        assert_eq!(h.transport.pending(), 1);
    }

    #[test]
    fn flush_of_nothing_sends_nothing() {
        let mut h = harness(TransportConfig::new(4000));
        h.transport.flush();
        assert_eq!(h.transport.stats().tx_batch, 0);
    }

    #[test]
    fn oversized_frame_dropped() {
        let mut h = harness(TransportConfig::new(4000));
        let big = vec![0u8; MAX_FRAME_LEN + 1];
        h.transport.send(mbuf(&h.pool, 0, &big));
        let stats = h.transport.stats();
        assert_eq!(stats.tx_drop_invalid, 1);
        assert_eq!(stats.tx_pkts, 0);
        assert_eq!(h.transport.pending(), 0);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn chained_frame_normalised() {
        let mut h = harness(TransportConfig::new(4000));
        let mut m = mbuf(&h.pool, 3, &[1, 2, 3]);
        m.append_segment(vec![4, 5]);
        h.transport.send(m);
        h.transport.flush();

        let msg = h.wire_out.recv_msg().unwrap();
        assert_eq!(
            parse_batch(&msg).unwrap(),
            vec![WirePacket {
                vport: 3,
                data: &[1, 2, 3, 4, 5]
            }]
        );
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn unicast_waits_for_gateway() {
        let mut h = harness(TransportConfig::new(4000));
        let mut client = Client::new(ClientConfig::new(MacAddr::new([0, 0, 1, 0, 0, 1])));
        client.bind_transport(Box::new(VethPort::new(2))).unwrap();

        let frame = mbuf(&h.pool, 0, &frame_with_vlans(&[], &[0; 20]));
        h.transport.send_buffer(
            Route::Unicast {
                client: &client,
                family: AddressFamily::Ipv4,
            },
            frame,
        );
        let stats = h.transport.stats();
        assert_eq!(stats.tx_drop_not_resolved, 1);
        assert_eq!(stats.tx_pkts, 0);
        assert_eq!(h.transport.pending(), 0);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn unicast_addresses_gateway() {
        let mut h = harness(TransportConfig::new(4000));
        let mac = MacAddr::new([0, 0, 1, 0, 0, 1]);
        let gateway = MacAddr::new([0, 0, 1, 0, 0, 0xfe]);
        let mut client = Client::new(ClientConfig::new(mac).force_ipv4_gateway(gateway));
        client.bind_transport(Box::new(VethPort::new(2))).unwrap();

        let frame = mbuf(&h.pool, 0, &frame_with_vlans(&[7], &[0; 20]));
        h.transport.send_buffer(
            Route::Unicast {
                client: &client,
                family: AddressFamily::Ipv4,
            },
            frame,
        );
        h.transport.flush();

        let msg = h.wire_out.recv_msg().unwrap();
        let packets = parse_batch(&msg).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].vport, 2);
        assert_eq!(&packets[0].data[..6], &gateway.bytes);
        assert_eq!(&packets[0].data[6..12], &mac.bytes);
    }

    #[test]
    fn unicast_without_port_is_invalid() {
        let mut h = harness(TransportConfig::new(4000));
        let client = Client::new(
            ClientConfig::new(MacAddr::new([0, 0, 1, 0, 0, 1]))
                .force_ipv4_gateway(MacAddr::new([0, 0, 1, 0, 0, 0xfe])),
        );
        let frame = mbuf(&h.pool, 0, &[0; 60]);
        h.transport.send_buffer(
            Route::Unicast {
                client: &client,
                family: AddressFamily::Ipv4,
            },
            frame,
        );
        assert_eq!(h.transport.stats().tx_drop_invalid, 1);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn malformed_message_delivers_nothing() {
        let mut h = harness(TransportConfig::new(4000));
        let (handler, seen) = collector(h.pool.clone());
        h.transport.set_handler(handler);

        let mut msg = batch(&[(1, &[1, 2, 3]), (1, &[4, 5, 6])]);
        msg.truncate(msg.len() - 1);
        assert!(h.transport.on_rx_message(&msg).is_err());

        assert!(seen.lock().unwrap().is_empty());
        let stats = h.transport.stats();
        assert_eq!(stats.rx_parse_err, 1);
        assert_eq!(stats.rx_pkts, 0);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn worker_delivers_in_order() {
        let mut h = harness(TransportConfig::new(4000));
        let (handler, seen) = collector(h.pool.clone());
        h.transport.set_handler(handler);
        h.transport.start_rx().unwrap();

        h.wire_in.send_msg(&batch(&[(1, b"first"), (2, b"second")])).unwrap();
        h.wire_in.send_msg(&batch(&[(3, b"third")])).unwrap();
        let mut taken = 0;
        while taken < 2 {
            taken += h.transport.recv_timeout(Duration::from_secs(1));
        }

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, b"first".to_vec()),
                (2, b"second".to_vec()),
                (3, b"third".to_vec())
            ]
        );
        assert_eq!(h.transport.stats().rx_pkts, 3);
        h.transport.close();
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn start_twice_rejected() {
        let mut h = harness(TransportConfig::new(4000));
        h.transport.start_rx().unwrap();
        match h.transport.start_rx() {
            Err(TransportError::AlreadyStarted) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn proxy_mode_uses_proxy_handler() {
        let mut h = harness(TransportConfig::new(4000).proxy_mode(true));
        let (handler, default_seen) = collector(h.pool.clone());
        let (proxy_handler, proxy_seen) = collector(h.pool.clone());
        h.transport.set_handler(handler);
        h.transport.set_proxy_handler(proxy_handler);

        h.transport.on_rx_message(&batch(&[(1, b"frame")])).unwrap();
        assert!(default_seen.lock().unwrap().is_empty());
        assert_eq!(proxy_seen.lock().unwrap().len(), 1);
    }

    fn rewrite_table() -> Arc<TranslationTable> {
        let table = TranslationTable::new();
        table
            .insert(
                "1/10".parse::<TunnelKey>().unwrap(),
                "2/20,30".parse::<TunnelKey>().unwrap(),
            )
            .unwrap();
        Arc::new(table)
    }

    #[test]
    fn rewrite_forwards_into_routed_domain() {
        let mut h = harness(TransportConfig::new(4000).tunnel_rewrite(true));
        let mut transport = h
            .transport
            .with_tunnel_rewrite(TunnelRewrite::new(rewrite_table(), 2));
        let (handler, seen) = collector(h.pool.clone());
        transport.set_handler(handler);

        let payload = pattern_payload(40);
        let frame = frame_with_vlans(&[10], &payload);
        transport.on_rx_message(&batch(&[(1, &frame)])).unwrap();
        transport.flush();

        let msg = h.wire_out.recv_msg().unwrap();
        let packets = parse_batch(&msg).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].vport, 2);
        assert_eq!(
            tunnel::decode(packets[0].data, 2).unwrap(),
            "2/20,30".parse::<TunnelKey>().unwrap()
        );
        assert!(packets[0].data.ends_with(&payload));
        assert!(seen.lock().unwrap().is_empty());

        // Back the other way.
        let routed = packets[0].data.to_vec();
        transport.on_rx_message(&batch(&[(2, &routed)])).unwrap();
        transport.flush();
        let msg = h.wire_out.recv_msg().unwrap();
        let packets = parse_batch(&msg).unwrap();
        assert_eq!(packets[0].vport, 1);
        assert_eq!(packets[0].data, &frame[..]);

        assert_eq!(transport.stats().rx_rewrite_fwd, 2);
        drop(transport);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn rewrite_miss_dropped() {
        let h = harness(TransportConfig::new(4000).tunnel_rewrite(true));
        let mut transport = h
            .transport
            .with_tunnel_rewrite(TunnelRewrite::new(rewrite_table(), 2));
        let frame = frame_with_vlans(&[11], &[0; 20]);
        transport.on_rx_message(&batch(&[(1, &frame)])).unwrap();
        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.stats().rx_rewrite_drop, 1);
        assert_eq!(h.pool.in_use(), 0);
    }

    #[test]
    fn rewrite_needs_the_switch() {
        let h = harness(TransportConfig::new(4000));
        let mut transport = h
            .transport
            .with_tunnel_rewrite(TunnelRewrite::new(rewrite_table(), 2));
        let (handler, seen) = collector(h.pool.clone());
        transport.set_handler(handler);

        let frame = frame_with_vlans(&[10], &[0; 20]);
        transport.on_rx_message(&batch(&[(1, &frame)])).unwrap();
        assert_eq!(transport.pending(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![(1, frame)]);
    }

    #[test]
    fn close_releases_pending() {
        let mut h = harness(TransportConfig::new(4000));
        h.transport.start_rx().unwrap();
        for _ in 0..3 {
            h.transport.send(mbuf(&h.pool, 0, &[0; 64]));
        }
        assert_eq!(h.pool.in_use(), 3);
        h.transport.close();
        h.transport.close();

        assert_eq!(h.pool.in_use(), 0);
        assert_eq!(h.transport.stats().tx_batch, 0);
        assert_eq!(h.transport.poll_rx(), 0);
    }

    #[test]
    fn monitor_sees_both_directions() {
        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut h = harness(TransportConfig::new(4000));
        let out = Shared::default();
        h.transport.set_monitor(K12Monitor::new(Box::new(out.clone())));
        h.transport.send(mbuf(&h.pool, 1, &[0xab]));
        h.transport.flush();
        h.transport.on_rx_message(&batch(&[(1, &[0xcd])])).unwrap();

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("->TX->"));
        assert!(text.contains("|0   |ab|"));
        assert!(text.contains("<-RX<-"));
        assert!(text.contains("|0   |cd|"));
    }
}
