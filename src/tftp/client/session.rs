use std::fmt;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::tftp::core::packet::{encode_ack, encode_data, encode_request};
use crate::tftp::core::{
    BLOCK_SIZE, MAX_PACKET_SIZE, Opcode, Packet, PacketError, TransferError, Transport, is_timeout,
};

/// Where a transfer stands
#[derive(Debug)]
pub enum TransferState {
    /// Download: waiting for DATA with this block number
    AwaitingData(u16),
    /// Upload: DATA with this block number is in flight
    AwaitingAck(u16),
    Done,
    Failed(TransferError),
}

impl TransferState {
    fn finish(self, report: TransferReport) -> Result<TransferReport, TransferError> {
        match self {
            TransferState::Done => Ok(report),
            TransferState::Failed(err) => Err(err),
            TransferState::AwaitingData(block) | TransferState::AwaitingAck(block) => Err(
                TransferError::UnexpectedResponse(format!("transfer stopped at block {}", block)),
            ),
        }
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Payload bytes written (download) or sent (upload)
    pub bytes: u64,
    /// DATA blocks exchanged, including a trailing empty block
    pub blocks: u64,
}

impl TransferReport {
    fn record(&mut self, len: usize) {
        self.bytes += len as u64;
        self.blocks += 1;
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes in {} blocks", self.bytes, self.blocks)
    }
}

/// One lock-step transfer over a transport
///
/// The session owns its transport and consumes itself in [`download`] or
/// [`upload`], so the socket is released however the transfer ends. The
/// first datagram from the server's host fixes its transfer port; later
/// packets go there and datagrams from any other source are ignored.
///
/// [`download`]: TransferSession::download
/// [`upload`]: TransferSession::upload
pub struct TransferSession<T: Transport> {
    transport: T,
    server: SocketAddr,
    peer: Option<SocketAddr>,
    timeout: Duration,
    write_handshake: bool,
}

impl<T: Transport> TransferSession<T> {
    pub fn new(transport: T, server: SocketAddr, timeout: Duration) -> Self {
        Self {
            transport,
            server,
            peer: None,
            timeout,
            write_handshake: false,
        }
    }

    /// Wait for ACK 0 after the write request before sending block 1.
    pub fn with_write_handshake(mut self, write_handshake: bool) -> Self {
        self.write_handshake = write_handshake;
        self
    }

    /// Fetch `filename` from the server into `sink` (RRQ).
    pub fn download<W: Write>(
        mut self,
        filename: &str,
        mode: &str,
        mut sink: W,
    ) -> Result<TransferReport, TransferError> {
        let request = encode_request(Opcode::Rrq, filename, mode)?;
        self.send(&request)?;
        log::debug!("Sent RRQ {:?} ({}) to {}", filename, mode, self.server);

        let mut report = TransferReport::default();
        let mut state = TransferState::AwaitingData(1);
        while let TransferState::AwaitingData(expected) = state {
            state = self
                .receive_block(expected, &mut sink, &mut report)
                .unwrap_or_else(TransferState::Failed);
        }

        if let TransferState::Done = state {
            sink.flush().map_err(TransferError::LocalFile)?;
            log::debug!("Download complete: {}", report);
        }
        state.finish(report)
    }

    /// Send `source` to the server as `filename` (WRQ).
    ///
    /// A source whose length is a multiple of 512 (including an empty one)
    /// ends with an empty DATA block.
    pub fn upload<R: Read>(
        mut self,
        filename: &str,
        mode: &str,
        mut source: R,
    ) -> Result<TransferReport, TransferError> {
        let request = encode_request(Opcode::Wrq, filename, mode)?;
        self.send(&request)?;
        log::debug!("Sent WRQ {:?} ({}) to {}", filename, mode, self.server);

        if self.write_handshake {
            self.await_ack(0)?;
        }

        let mut report = TransferReport::default();
        let mut last_len = self.send_block(1, &mut source, &mut report)?;
        let mut state = TransferState::AwaitingAck(1);
        while let TransferState::AwaitingAck(sent) = state {
            state = match self.await_ack(sent) {
                Err(err) => TransferState::Failed(err),
                Ok(()) if last_len < BLOCK_SIZE => TransferState::Done,
                Ok(()) => {
                    let next = sent.wrapping_add(1);
                    match self.send_block(next, &mut source, &mut report) {
                        Ok(len) => {
                            last_len = len;
                            TransferState::AwaitingAck(next)
                        }
                        Err(err) => TransferState::Failed(err),
                    }
                }
            };
        }

        if let TransferState::Done = state {
            log::debug!("Upload complete: {}", report);
        }
        state.finish(report)
    }

    fn receive_block<W: Write>(
        &mut self,
        expected: u16,
        sink: &mut W,
        report: &mut TransferReport,
    ) -> Result<TransferState, TransferError> {
        match self.receive()?.ok_or(TransferError::Timeout)? {
            Packet::Data { block_num, data } if block_num == expected => {
                sink.write_all(&data).map_err(TransferError::LocalFile)?;
                report.record(data.len());
                self.send(&encode_ack(block_num))?;
                log::debug!("Received block {} ({} bytes)", block_num, data.len());

                if data.len() < BLOCK_SIZE {
                    Ok(TransferState::Done)
                } else {
                    Ok(TransferState::AwaitingData(expected.wrapping_add(1)))
                }
            }
            Packet::Error { code, msg } => Err(TransferError::ServerError { code, message: msg }),
            other => Err(unexpected(Opcode::Data, expected, &other)),
        }
    }

    /// Read up to one block from `source` and send it. Returns the payload length.
    fn send_block<R: Read>(
        &mut self,
        block_num: u16,
        source: &mut R,
        report: &mut TransferReport,
    ) -> Result<usize, TransferError> {
        let mut chunk = Vec::with_capacity(BLOCK_SIZE);
        source
            .by_ref()
            .take(BLOCK_SIZE as u64)
            .read_to_end(&mut chunk)
            .map_err(TransferError::LocalFile)?;

        self.send(&encode_data(block_num, &chunk)?)?;
        report.record(chunk.len());
        log::debug!("Sent block {} ({} bytes)", block_num, chunk.len());
        Ok(chunk.len())
    }

    /// Anything but the matching ACK, an ERROR packet included, ends the upload.
    fn await_ack(&mut self, block_num: u16) -> Result<(), TransferError> {
        match self.receive()?.ok_or(TransferError::AckTimeout)? {
            Packet::Ack(acked) if acked == block_num => Ok(()),
            other => Err(unexpected(Opcode::Ack, block_num, &other)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<(), TransferError> {
        let to = self.peer.unwrap_or(self.server);
        self.transport.send_to(buf, to).map_err(TransferError::Transport)
    }

    /// Wait for the next packet from the server. `None` means the timeout elapsed.
    ///
    /// Ignored datagrams do not extend the wait.
    fn receive(&mut self) -> Result<Option<Packet>, TransferError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let (buf, from) = match self.transport.recv_from(MAX_PACKET_SIZE, remaining) {
                Ok(received) => received,
                Err(err) if is_timeout(&err) => return Ok(None),
                Err(err) => return Err(TransferError::Transport(err)),
            };

            match self.peer {
                None if from.ip() != self.server.ip() => {
                    log::warn!("Ignoring datagram from foreign host {}", from);
                    continue;
                }
                None => {
                    if from != self.server {
                        log::debug!("Server continues the transfer from {}", from);
                    }
                    self.peer = Some(from);
                }
                Some(peer) if peer != from => {
                    log::warn!("Ignoring datagram from unknown source {}", from);
                    continue;
                }
                Some(_) => {}
            }

            return match Packet::deserialize(&buf) {
                Ok(packet) => Ok(Some(packet)),
                Err(PacketError::UnknownOpcode(opcode)) => Err(TransferError::UnexpectedResponse(
                    format!("unknown opcode {}", opcode),
                )),
                Err(err) => Err(err.into()),
            };
        }
    }
}

fn unexpected(wanted: Opcode, block_num: u16, received: &Packet) -> TransferError {
    TransferError::UnexpectedResponse(format!(
        "expected {} block {}, received {}",
        wanted, block_num, received
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;
    use std::thread;

    const SERVER: &str = "10.0.0.1:69";
    const SERVER_TID: &str = "10.0.0.1:40000";
    const FOREIGN: &str = "10.0.0.9:5555";

    enum Reply {
        From(SocketAddr, Vec<u8>),
        /// Arrives after the delay, unless the receive timeout runs out first
        Delayed(Duration, SocketAddr, Vec<u8>),
        Timeout,
    }

    type SentLog = Rc<RefCell<Vec<(Vec<u8>, SocketAddr)>>>;

    /// Scripted transport: replies are handed out in order, an empty script times out.
    struct MockTransport {
        replies: VecDeque<Reply>,
        sent: SentLog,
        /// Timeout passed to every receive
        waits: Rc<RefCell<Vec<Duration>>>,
    }

    impl MockTransport {
        fn new(replies: Vec<Reply>) -> (Self, SentLog) {
            let sent = SentLog::default();
            let transport = Self {
                replies: replies.into(),
                sent: Rc::clone(&sent),
                waits: Rc::default(),
            };
            (transport, sent)
        }
    }

    impl Transport for MockTransport {
        fn send_to(&mut self, buf: &[u8], addr: SocketAddr) -> io::Result<()> {
            self.sent.borrow_mut().push((buf.to_vec(), addr));
            Ok(())
        }

        fn recv_from(
            &mut self,
            max_len: usize,
            timeout: Duration,
        ) -> io::Result<(Vec<u8>, SocketAddr)> {
            self.waits.borrow_mut().push(timeout);
            let (addr, mut bytes) = match self.replies.pop_front() {
                Some(Reply::From(addr, bytes)) => (addr, bytes),
                Some(Reply::Delayed(delay, addr, bytes)) => {
                    if delay >= timeout {
                        thread::sleep(timeout);
                        return Err(io::ErrorKind::WouldBlock.into());
                    }
                    thread::sleep(delay);
                    (addr, bytes)
                }
                Some(Reply::Timeout) | None => return Err(io::ErrorKind::WouldBlock.into()),
            };
            bytes.truncate(max_len);
            Ok((bytes, addr))
        }
    }

    fn server() -> SocketAddr {
        SERVER.parse().unwrap()
    }

    fn reply(packet: Packet) -> Reply {
        Reply::From(server(), packet.serialize().unwrap())
    }

    fn data(block_num: u16, data: &[u8]) -> Reply {
        reply(Packet::Data {
            block_num,
            data: data.to_vec(),
        })
    }

    fn scripted(replies: Vec<Reply>) -> (TransferSession<MockTransport>, SentLog) {
        let (transport, sent) = MockTransport::new(replies);
        let session = TransferSession::new(transport, server(), Duration::from_secs(5));
        (session, sent)
    }

    fn sent_packets(sent: &SentLog) -> Vec<Packet> {
        sent.borrow()
            .iter()
            .map(|(bytes, _)| Packet::deserialize(bytes).unwrap())
            .collect()
    }

    fn destinations(sent: &SentLog) -> Vec<SocketAddr> {
        sent.borrow().iter().map(|(_, addr)| *addr).collect()
    }

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn report(bytes: u64, blocks: u64) -> TransferReport {
        TransferReport { bytes, blocks }
    }

    fn rrq(filename: &str) -> Packet {
        Packet::Rrq {
            filename: filename.into(),
            mode: "octet".into(),
        }
    }

    fn wrq(filename: &str) -> Packet {
        Packet::Wrq {
            filename: filename.into(),
            mode: "octet".into(),
        }
    }

    fn data_packet(block_num: u16, data: &[u8]) -> Packet {
        Packet::Data {
            block_num,
            data: data.to_vec(),
        }
    }

    #[test]
    fn download_reassembles_blocks() {
        let file = content(1000);
        let (session, sent) = scripted(vec![data(1, &file[..512]), data(2, &file[512..])]);

        let mut sink = Vec::new();
        let result = session.download("kernel.bin", "octet", &mut sink).unwrap();

        assert_eq!(sink, file);
        assert_eq!(result, report(1000, 2));
        assert_eq!(
            sent_packets(&sent),
            vec![rrq("kernel.bin"), Packet::Ack(1), Packet::Ack(2)]
        );
    }

    #[test]
    fn download_of_block_multiple_needs_trailing_empty_block() {
        let file = content(1024);
        let (session, sent) = scripted(vec![
            data(1, &file[..512]),
            data(2, &file[512..]),
            data(3, &[]),
        ]);

        let mut sink = Vec::new();
        let result = session.download("f", "octet", &mut sink).unwrap();

        assert_eq!(sink, file);
        assert_eq!(result.blocks, 3);
        assert_eq!(sent_packets(&sent).last(), Some(&Packet::Ack(3)));
    }

    #[test]
    fn download_of_empty_file() {
        let (session, sent) = scripted(vec![data(1, &[])]);
        let mut sink = Vec::new();
        let result = session.download("empty", "octet", &mut sink).unwrap();

        assert!(sink.is_empty());
        assert_eq!(result, report(0, 1));
        assert_eq!(sent_packets(&sent), vec![rrq("empty"), Packet::Ack(1)]);
    }

    #[test]
    fn download_acks_every_block_in_order() {
        let file = content(5 * 512 + 17);
        let replies = file
            .chunks(512)
            .enumerate()
            .map(|(i, chunk)| data(i as u16 + 1, chunk))
            .collect();
        let (session, sent) = scripted(replies);

        session.download("f", "octet", Vec::new()).unwrap();

        let acks: Vec<u16> = sent_packets(&sent)
            .into_iter()
            .filter_map(|p| match p {
                Packet::Ack(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn download_fails_on_block_mismatch() {
        let (session, sent) = scripted(vec![data(2, b"out of order")]);
        let err = session.download("f", "octet", Vec::new()).unwrap_err();

        assert!(matches!(err, TransferError::UnexpectedResponse(_)));
        assert_eq!(sent_packets(&sent), vec![rrq("f")]);
    }

    #[test]
    fn download_fails_on_duplicate_block() {
        let block = content(512);
        let (session, sent) = scripted(vec![data(1, &block), data(1, &block)]);
        let err = session.download("f", "octet", Vec::new()).unwrap_err();

        assert!(matches!(err, TransferError::UnexpectedResponse(_)));
        assert_eq!(sent_packets(&sent), vec![rrq("f"), Packet::Ack(1)]);
    }

    #[test]
    fn download_reports_server_error_without_ack() {
        let (session, sent) = scripted(vec![reply(Packet::Error {
            code: 1,
            msg: "File not found.".into(),
        })]);
        let err = session.download("missing", "octet", Vec::new()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Server error 1 (File not found): File not found."
        );
        match err {
            TransferError::ServerError { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, "File not found.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sent_packets(&sent), vec![rrq("missing")]);
    }

    #[test]
    fn download_times_out_without_further_packets() {
        let (session, sent) = scripted(vec![data(1, &content(512)), Reply::Timeout]);
        let err = session.download("f", "octet", Vec::new()).unwrap_err();

        assert!(matches!(err, TransferError::Timeout));
        assert_eq!(sent_packets(&sent), vec![rrq("f"), Packet::Ack(1)]);
    }

    #[test]
    fn foreign_datagrams_do_not_extend_the_wait() {
        let foreign: SocketAddr = FOREIGN.parse().unwrap();
        let mut replies = vec![data(1, &content(512))];
        replies.extend(
            (0..20).map(|_| Reply::Delayed(Duration::from_millis(30), foreign, encode_ack(9))),
        );
        let (transport, sent) = MockTransport::new(replies);
        let waits = Rc::clone(&transport.waits);
        let session = TransferSession::new(transport, server(), Duration::from_millis(100));

        let started = Instant::now();
        let err = session.download("f", "octet", Vec::new()).unwrap_err();

        assert!(matches!(err, TransferError::Timeout));
        assert!(
            started.elapsed() < Duration::from_millis(400),
            "timeout took {:?}",
            started.elapsed()
        );
        assert_eq!(sent_packets(&sent), vec![rrq("f"), Packet::Ack(1)]);

        // Every receive after block 1 draws on the same shrinking budget
        let waits = waits.borrow();
        assert!(waits.iter().all(|wait| *wait <= Duration::from_millis(100)));
        assert!(waits[1..].windows(2).all(|pair| pair[1] < pair[0]));
    }

    #[test]
    fn download_rejects_other_opcodes() {
        let (session, _) = scripted(vec![reply(Packet::Ack(1))]);
        let err = session.download("f", "octet", Vec::new()).unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedResponse(_)));

        let (session, _) = scripted(vec![Reply::From(server(), vec![0, 9, 0, 1])]);
        let err = session.download("f", "octet", Vec::new()).unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedResponse(_)));
    }

    #[test]
    fn download_fails_on_truncated_datagram() {
        let (session, _) = scripted(vec![Reply::From(server(), vec![0, 3, 0])]);
        let err = session.download("f", "octet", Vec::new()).unwrap_err();
        assert!(matches!(err, TransferError::Packet(PacketError::TooShort(3))));
    }

    #[test]
    fn download_reports_sink_failure_without_ack() {
        struct BrokenSink;
        impl Write for BrokenSink {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (session, sent) = scripted(vec![data(1, b"abc")]);
        let err = session.download("f", "octet", BrokenSink).unwrap_err();

        assert!(matches!(err, TransferError::LocalFile(_)));
        assert_eq!(sent_packets(&sent), vec![rrq("f")]);
    }

    #[test]
    fn replies_follow_the_server_transfer_port() {
        let tid: SocketAddr = SERVER_TID.parse().unwrap();
        let foreign: SocketAddr = FOREIGN.parse().unwrap();
        let block = |n: u16, len: usize| data_packet(n, &content(len)).serialize().unwrap();
        let (session, sent) = scripted(vec![
            Reply::From(tid, block(1, 512)),
            Reply::From(foreign, block(2, 10)),
            Reply::From(tid, block(2, 10)),
        ]);

        let result = session.download("f", "octet", Vec::new()).unwrap();
        assert_eq!(result.bytes, 522);
        assert_eq!(destinations(&sent), vec![server(), tid, tid]);
    }

    #[test]
    fn first_reply_must_come_from_the_server_host() {
        let tid: SocketAddr = SERVER_TID.parse().unwrap();
        let foreign: SocketAddr = FOREIGN.parse().unwrap();
        let (session, sent) = scripted(vec![
            Reply::From(foreign, data_packet(1, b"forged").serialize().unwrap()),
            Reply::From(tid, data_packet(1, b"genuine").serialize().unwrap()),
        ]);

        let mut sink = Vec::new();
        session.download("f", "octet", &mut sink).unwrap();

        assert_eq!(sink, b"genuine");
        assert_eq!(destinations(&sent), vec![server(), tid]);
    }

    #[test]
    fn invalid_filename_sends_nothing() {
        let (session, sent) = scripted(vec![]);
        let err = session.download("bad\0name", "octet", Vec::new()).unwrap_err();

        assert!(matches!(
            err,
            TransferError::Packet(PacketError::InvalidArgument(_))
        ));
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn upload_splits_into_blocks() {
        let file = content(1000);
        let (session, sent) = scripted(vec![reply(Packet::Ack(1)), reply(Packet::Ack(2))]);

        let result = session.upload("notes.txt", "octet", file.as_slice()).unwrap();

        assert_eq!(result, report(1000, 2));
        assert_eq!(
            sent_packets(&sent),
            vec![
                wrq("notes.txt"),
                data_packet(1, &file[..512]),
                data_packet(2, &file[512..]),
            ]
        );
    }

    #[test]
    fn upload_of_empty_file_sends_one_empty_block() {
        let (session, sent) = scripted(vec![reply(Packet::Ack(1))]);
        let result = session.upload("empty", "octet", io::empty()).unwrap();

        assert_eq!(result, report(0, 1));
        assert_eq!(
            sent_packets(&sent),
            vec![wrq("empty"), data_packet(1, &[])]
        );
    }

    #[test]
    fn upload_of_block_multiple_ends_with_empty_block() {
        let file = content(512);
        let (session, sent) = scripted(vec![reply(Packet::Ack(1)), reply(Packet::Ack(2))]);
        let result = session.upload("f", "octet", file.as_slice()).unwrap();

        assert_eq!(result, report(512, 2));
        assert_eq!(sent_packets(&sent).last(), Some(&data_packet(2, &[])));
    }

    #[test]
    fn upload_fails_on_ack_mismatch() {
        // Without the handshake an ACK 0 is not expected
        let (session, sent) = scripted(vec![reply(Packet::Ack(0))]);
        let err = session.upload("f", "octet", &b"hello"[..]).unwrap_err();

        assert!(matches!(err, TransferError::UnexpectedResponse(_)));
        assert_eq!(sent.borrow().len(), 2);
    }

    #[test]
    fn upload_fails_on_other_opcode() {
        let (session, _) = scripted(vec![data(1, b"nope")]);
        let err = session.upload("f", "octet", &b"hello"[..]).unwrap_err();
        assert!(matches!(err, TransferError::UnexpectedResponse(_)));
    }

    #[test]
    fn upload_times_out_waiting_for_ack() {
        let file = content(2048);
        let (session, sent) = scripted(vec![reply(Packet::Ack(1))]);
        let err = session.upload("f", "octet", file.as_slice()).unwrap_err();

        assert!(matches!(err, TransferError::AckTimeout));
        assert_eq!(
            sent_packets(&sent)
                .iter()
                .filter(|p| p.opcode() == Opcode::Data)
                .count(),
            2
        );
    }

    #[test]
    fn upload_treats_error_packet_as_unexpected_response() {
        let (session, sent) = scripted(vec![reply(Packet::Error {
            code: 2,
            msg: "Access violation".into(),
        })]);
        let err = session.upload("f", "octet", &b"x"[..]).unwrap_err();

        match err {
            TransferError::UnexpectedResponse(text) => {
                assert!(text.contains("ERROR 2: Access violation"), "{text}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sent_packets(&sent), vec![wrq("f"), data_packet(1, b"x")]);
    }

    #[test]
    fn upload_with_handshake_waits_for_ack_zero() {
        let (transport, sent) =
            MockTransport::new(vec![reply(Packet::Ack(0)), reply(Packet::Ack(1))]);
        let session = TransferSession::new(transport, server(), Duration::from_secs(5))
            .with_write_handshake(true);

        let result = session.upload("f", "octet", &b"tiny"[..]).unwrap();

        assert_eq!(result.bytes, 4);
        assert_eq!(
            sent_packets(&sent),
            vec![wrq("f"), data_packet(1, b"tiny")]
        );
    }

    #[test]
    fn upload_handshake_timeout_sends_no_data() {
        let (transport, sent) = MockTransport::new(vec![]);
        let session = TransferSession::new(transport, server(), Duration::from_secs(5))
            .with_write_handshake(true);

        let err = session.upload("f", "octet", &b"tiny"[..]).unwrap_err();
        assert!(matches!(err, TransferError::AckTimeout));
        assert_eq!(sent_packets(&sent), vec![wrq("f")]);
    }
}
