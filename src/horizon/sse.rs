//! Incremental decoder for `text/event-stream` bodies.
//!
//! Horizon streams one JSON record per `data:` event. Chunks from the HTTP body can split
//! events (and UTF-8 sequences) at arbitrary points, so bytes are buffered until a blank
//! line terminates an event.

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
	pub event: Option<String>,
	pub id: Option<String>,
	pub data: String,
}

impl SseEvent {
	/// Horizon's handshake event carries `"hello"` and no record.
	pub fn is_open(&self) -> bool {
		self.event.as_deref() == Some("open")
	}
}

#[derive(Debug, Default)]
pub struct SseDecoder {
	buffer: Vec<u8>,
}

impl SseDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feed a chunk and return every event it completed.
	pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
		self.buffer.extend_from_slice(chunk);

		let mut events = Vec::new();
		while let Some((end, delimiter_len)) = find_event_end(&self.buffer) {
			let raw: Vec<u8> = self.buffer.drain(..end + delimiter_len).collect();
			let text = String::from_utf8_lossy(&raw[..end]);
			if let Some(event) = parse_event(&text) {
				events.push(event);
			}
		}
		events
	}
}

fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
	let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
	let crlf = buffer
		.windows(4)
		.position(|w| w == b"\r\n\r\n")
		.map(|p| (p, 4));

	match (lf, crlf) {
		(Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
		(a, b) => a.or(b),
	}
}

fn parse_event(text: &str) -> Option<SseEvent> {
	let mut event = SseEvent::default();
	let mut data_lines = Vec::new();

	for line in text.lines() {
		// comment / heartbeat
		if line.is_empty() || line.starts_with(':') {
			continue;
		}

		let (field, value) = match line.split_once(':') {
			Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
			None => (line, ""),
		};

		match field {
			"data" => data_lines.push(value.to_string()),
			"event" => event.event = Some(value.to_string()),
			"id" => event.id = Some(value.to_string()),
			_ => {}
		}
	}

	if data_lines.is_empty() {
		return None;
	}

	event.data = data_lines.join("\n");
	Some(event)
}
