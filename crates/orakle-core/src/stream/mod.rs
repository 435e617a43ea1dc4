//! Incremental parser that splits an LLM chat stream into narrative text
//! and in-band skill directives.
//!
//! Directive syntax: an opening marker `<<<ORAKLE`, an arbitrary body, and
//! a closing marker `ORAKLE`. Either marker may arrive split across chunk
//! boundaries, so the parser buffers across `feed` calls rather than
//! scanning each chunk in isolation.
//!
//! The closing marker only counts as a close when it is a whitespace- or
//! edge-delimited standalone token. A body that legitimately contains the
//! word `ORAKLE` (e.g. "look up the meaning of ORAKLE") is itself such a
//! token, so a lone boundary check isn't enough: when a standalone `ORAKLE`
//! is immediately followed (after its delimiting whitespace) by another
//! one, the first is treated as body content and scanning continues from
//! the second. A standalone token sitting at the exact tail of the
//! currently buffered data is ambiguous — more input might still turn it
//! into a pair — so it is only accepted once real content follows it or
//! the stream has ended.

const OPEN_MARKER: &str = "<<<ORAKLE";
const CLOSE_MARKER: &str = "ORAKLE";

/// Parser state. `Terminated` is reached once and is sticky: further
/// `feed` calls after `finish` are a caller error, not handled specially.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Outside,
    Inside,
    Terminated,
}

/// An event produced while feeding chunks through the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    /// A run of plain text outside any directive.
    Narrative(String),
    /// A complete directive body, extracted between the markers.
    Directive(String),
    /// The stream closed with an unterminated directive still open; the
    /// buffered body is discarded and reported here for logging.
    UnterminatedDirective(String),
}

/// Stateful, allocation-light scanner over a chat stream's text chunks.
pub struct StreamParser {
    state: ParserState,
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self { state: ParserState::Outside, buffer: String::new() }
    }

    /// Feed the next chunk of the stream, returning any events it completes.
    /// Bytes that might be the start of a marker split across a chunk
    /// boundary are held back rather than emitted as narrative.
    pub fn feed(&mut self, chunk: &str) -> Vec<ParserEvent> {
        self.buffer.push_str(chunk);
        self.advance(false)
    }

    /// Signal upstream close. Gives any marker pending at the tail of the
    /// buffer one last chance to resolve now that no more data is coming,
    /// then, if a directive is still open, reports it as unterminated
    /// rather than silently dropping it. In `Outside`, flushes the
    /// remaining buffer as a final narrative chunk.
    pub fn finish(&mut self) -> Vec<ParserEvent> {
        let mut events = self.advance(true);
        let trailing = match self.state {
            ParserState::Outside if !self.buffer.is_empty() => Some(ParserEvent::Narrative(std::mem::take(&mut self.buffer))),
            ParserState::Outside => None,
            ParserState::Inside => Some(ParserEvent::UnterminatedDirective(std::mem::take(&mut self.buffer))),
            ParserState::Terminated => None,
        };
        self.state = ParserState::Terminated;
        events.extend(trailing);
        events
    }

    /// Drain as many complete narrative/directive events out of the buffer
    /// as the currently available data confirms. `stream_ended` tells the
    /// closing-marker search whether a marker sitting at the very tail of
    /// the buffer can be trusted as final or must wait for more input.
    fn advance(&mut self, stream_ended: bool) -> Vec<ParserEvent> {
        let mut events = Vec::new();

        loop {
            match self.state {
                ParserState::Outside => {
                    if let Some(pos) = self.buffer.find(OPEN_MARKER) {
                        if pos > 0 {
                            events.push(ParserEvent::Narrative(self.buffer[..pos].to_owned()));
                        }
                        self.buffer.drain(..pos + OPEN_MARKER.len());
                        self.state = ParserState::Inside;
                        continue;
                    }
                    let overlap = partial_suffix_match(&self.buffer, OPEN_MARKER);
                    let emit_len = self.buffer.len() - overlap;
                    if emit_len > 0 {
                        events.push(ParserEvent::Narrative(self.buffer[..emit_len].to_owned()));
                        self.buffer.drain(..emit_len);
                    }
                    break;
                }
                ParserState::Inside => {
                    if let Some(pos) = find_close_marker(&self.buffer, stream_ended) {
                        let body = self.buffer[..pos].to_owned();
                        self.buffer.drain(..pos + CLOSE_MARKER.len());
                        events.push(ParserEvent::Directive(body));
                        self.state = ParserState::Outside;
                        continue;
                    }
                    // No confirmed close yet: either no marker is present,
                    // or one is pending at the buffer's edge and might still
                    // turn out to be half of an escaped pair.
                    break;
                }
                ParserState::Terminated => break,
            }
        }

        events
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the closing marker in an in-progress directive body: a whitespace-
/// or edge-delimited standalone `ORAKLE` token. A standalone token that is
/// immediately followed (past its delimiting whitespace) by another one is
/// treated as body content rather than a close, so a literal "ORAKLE" in
/// the body doesn't truncate the directive early. `stream_ended` controls
/// whether a token sitting at the exact tail of `buf` — where a following
/// pairing token, if any, hasn't arrived yet — can be accepted as final.
fn find_close_marker(buf: &str, stream_ended: bool) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = buf[from..].find(CLOSE_MARKER) {
        let start = from + rel;
        let end = start + CLOSE_MARKER.len();

        let preceded_ok = start == 0 || buf[..start].chars().last().is_some_and(char::is_whitespace);
        if !preceded_ok {
            from = start + 1;
            continue;
        }

        let tail = &buf[end..];
        let Some(first_tail_char) = tail.chars().next() else {
            // Nothing follows yet; a pairing token could still be on the way.
            return if stream_ended { Some(start) } else { None };
        };
        if !first_tail_char.is_whitespace() {
            // Not standalone: this is a prefix of a longer word.
            from = start + 1;
            continue;
        }

        let after_ws = tail.trim_start();
        if after_ws.is_empty() {
            // Only whitespace remains; can't rule out a pairing token yet.
            return if stream_ended { Some(start) } else { None };
        }
        if after_ws.starts_with(CLOSE_MARKER) {
            let next_start = buf.len() - after_ws.len();
            if next_start + CLOSE_MARKER.len() > buf.len() {
                // The candidate pairing token is still arriving.
                return if stream_ended { Some(start) } else { None };
            }
            // Adjacent standalone-looking token: `start` is body content.
            from = next_start;
            continue;
        }

        return Some(start);
    }
    None
}

/// Length of the longest suffix of `buf` that is also a prefix of `marker`,
/// excluding a full match (callers check `find` first). Used to hold back
/// bytes at a chunk boundary that might be the start of a marker.
fn partial_suffix_match(buf: &str, marker: &str) -> usize {
    let max_check = (marker.len().saturating_sub(1)).min(buf.len());
    for len in (1..=max_check).rev() {
        if buf.ends_with(&marker[..len]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative(events: &[ParserEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Narrative(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_narrative_no_directive() {
        let mut p = StreamParser::new();
        let mut events = p.feed("hello there, no directives here");
        events.extend(p.finish());
        assert_eq!(narrative(&events), "hello there, no directives here");
        assert!(!events.iter().any(|e| matches!(e, ParserEvent::Directive(_))));
    }

    #[test]
    fn single_directive_whole_chunk() {
        let mut p = StreamParser::new();
        let events = p.feed("before <<<ORAKLE compute cos(3.14159) * 2 ORAKLE after");
        assert_eq!(events[0], ParserEvent::Narrative("before ".to_owned()));
        assert_eq!(events[1], ParserEvent::Directive(" compute cos(3.14159) * 2 ".to_owned()));
        assert_eq!(events[2], ParserEvent::Narrative(" after".to_owned()));
    }

    #[test]
    fn opening_marker_split_across_chunks() {
        let mut p = StreamParser::new();
        let mut events = p.feed("narrative text <<<ORA");
        events.extend(p.feed("KLE directive body ORAKLE"));
        events.extend(p.finish());
        assert_eq!(events[0], ParserEvent::Narrative("narrative text ".to_owned()));
        assert_eq!(events[1], ParserEvent::Directive(" directive body ".to_owned()));
    }

    #[test]
    fn closing_marker_split_across_chunks() {
        let mut p = StreamParser::new();
        let mut events = p.feed("<<<ORAKLE body text OR");
        events.extend(p.feed("AKLE trailing"));
        assert_eq!(events[0], ParserEvent::Directive(" body text ".to_owned()));
        assert_eq!(events[1], ParserEvent::Narrative("trailing".to_owned()));
    }

    #[test]
    fn body_containing_close_marker_does_not_close_on_first_occurrence() {
        let mut p = StreamParser::new();
        let events = p.feed("<<<ORAKLE look up the meaning of ORAKLE ORAKLE tail");
        assert_eq!(events[0], ParserEvent::Directive(" look up the meaning of ORAKLE ".to_owned()));
        assert_eq!(events[1], ParserEvent::Narrative(" tail".to_owned()));
    }

    #[test]
    fn narrative_precedes_directive_event_ordering() {
        let mut p = StreamParser::new();
        let mut events = p.feed("intro text <<<ORAKLE do a thing ORAKLE");
        events.extend(p.finish());
        assert!(matches!(events[0], ParserEvent::Narrative(_)));
        assert!(matches!(events[1], ParserEvent::Directive(_)));
    }

    #[test]
    fn unterminated_directive_on_finish_emits_error_event() {
        let mut p = StreamParser::new();
        p.feed("<<<ORAKLE this directive never closes");
        let events = p.finish();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ParserEvent::UnterminatedDirective(body) if body.contains("never closes")));
    }

    #[test]
    fn finish_flushes_trailing_narrative() {
        let mut p = StreamParser::new();
        p.feed("no directive at all");
        let events = p.finish();
        assert_eq!(events, vec![ParserEvent::Narrative("no directive at all".to_owned())]);
    }

    #[test]
    fn finish_on_empty_outside_buffer_emits_nothing() {
        // The marker sits flush against the chunk's tail, so the one
        // directive it closes only resolves once `finish` confirms no more
        // data is coming; either way no trailing empty narrative appears.
        let mut p = StreamParser::new();
        let mut events = p.feed("<<<ORAKLE x ORAKLE");
        events.extend(p.finish());
        assert_eq!(events, vec![ParserEvent::Directive(" x ".to_owned())]);
    }

    #[test]
    fn multiple_directives_in_one_chunk() {
        let mut p = StreamParser::new();
        let mut events = p.feed("<<<ORAKLE first ORAKLE middle <<<ORAKLE second ORAKLE");
        events.extend(p.finish());
        let directives: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Directive(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(directives, vec![" first ".to_owned(), " second ".to_owned()]);
    }

    #[test]
    fn byte_by_byte_feed_reconstructs_same_events_as_whole_chunk() {
        let input = "intro <<<ORAKLE do the thing ORAKLE tail text";
        let mut whole = StreamParser::new();
        let mut whole_events = whole.feed(input);
        whole_events.extend(whole.finish());

        let mut incremental = StreamParser::new();
        let mut incremental_events = Vec::new();
        for ch in input.chars() {
            incremental_events.extend(incremental.feed(&ch.to_string()));
        }
        incremental_events.extend(incremental.finish());

        let whole_narrative: String = narrative(&whole_events);
        let incremental_narrative: String = narrative(&incremental_events);
        assert_eq!(whole_narrative, incremental_narrative);

        let whole_directives: Vec<_> = whole_events.iter().filter(|e| matches!(e, ParserEvent::Directive(_))).collect();
        let incremental_directives: Vec<_> = incremental_events.iter().filter(|e| matches!(e, ParserEvent::Directive(_))).collect();
        assert_eq!(whole_directives, incremental_directives);
    }
}
