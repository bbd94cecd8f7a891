//! Plan-block detection over streamed text.
//!
//! Text arrives in arbitrary chunks. A `<plan>` … `</plan>` block inside it
//! is cut out and reported separately; a marker split across chunks is
//! recognized because any suffix that could still become a marker is held
//! back until the next chunk decides it.

pub const OPEN_MARKER: &str = "<plan>";
pub const CLOSE_MARKER: &str = "</plan>";

/// One piece of output from the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Ordinary text to stream.
    Text(String),
    /// The trimmed body of a complete plan block.
    Plan(String),
}

#[derive(Debug, Default)]
pub struct PlanDetector {
    /// Unconsumed input, possibly ending in a partial marker
    pending: String,
    in_plan: bool,
    /// Plan body collected so far
    plan: String,
    /// Strip leading whitespace from the next text after a plan block
    trim_next: bool,
}

impl PlanDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_plan(&self) -> bool {
        self.in_plan
    }

    /// Feed one chunk and return whatever can be decided so far.
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        self.pending.push_str(chunk);
        let mut out = Vec::new();

        loop {
            if self.in_plan {
                if let Some(pos) = self.pending.find(CLOSE_MARKER) {
                    self.plan.push_str(&self.pending[..pos]);
                    self.pending.drain(..pos + CLOSE_MARKER.len());
                    out.push(Segment::Plan(self.plan.trim().to_string()));
                    self.plan.clear();
                    self.in_plan = false;
                    self.trim_next = true;
                    continue;
                }
                let keep = partial_marker_len(&self.pending, CLOSE_MARKER);
                let take = self.pending.len() - keep;
                self.plan.push_str(&self.pending[..take]);
                self.pending.drain(..take);
                break;
            }

            if let Some(pos) = self.pending.find(OPEN_MARKER) {
                let before = self.pending[..pos].trim_end().to_string();
                self.pending.drain(..pos + OPEN_MARKER.len());
                self.emit_text(&before, &mut out);
                self.in_plan = true;
                continue;
            }

            // Hold back a possible marker prefix and the whitespace before
            // it, so a flush ahead of a marker can still be trimmed.
            let keep = partial_marker_len(&self.pending, OPEN_MARKER);
            let head = &self.pending[..self.pending.len() - keep];
            let take = head.trim_end().len();
            let text = self.pending[..take].to_string();
            self.pending.drain(..take);
            self.emit_text(&text, &mut out);
            break;
        }

        out
    }

    /// Release held-back text that cannot start a marker any more, such as
    /// at the end of one backend response. Does nothing inside a plan.
    pub fn flush_text(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        if !self.in_plan {
            let text = std::mem::take(&mut self.pending);
            self.emit_text(text.trim_end(), &mut out);
        }
        out
    }

    /// End of turn: everything left is text, including an unterminated plan.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut rest = String::new();
        if self.in_plan {
            rest.push_str(OPEN_MARKER);
            rest.push_str(&std::mem::take(&mut self.plan));
            self.in_plan = false;
        }
        rest.push_str(&std::mem::take(&mut self.pending));
        self.emit_text(rest.trim_end(), &mut out);
        self.trim_next = false;
        out
    }

    fn emit_text(&mut self, text: &str, out: &mut Vec<Segment>) {
        let text = if self.trim_next { text.trim_start() } else { text };
        if text.is_empty() {
            return;
        }
        self.trim_next = false;
        out.push(Segment::Text(text.to_string()));
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&n| {
            text.len() >= n
                && text.is_char_boundary(text.len() - n)
                && text.ends_with(&marker[..n])
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> Vec<Segment> {
        let mut detector = PlanDetector::new();
        let mut out: Vec<Segment> = chunks.iter().flat_map(|c| detector.push(c)).collect();
        out.extend(detector.finish());
        out
    }

    #[test]
    fn plan_across_three_chunks() {
        let out = run(&["plan:\n<plan>", "step A\nstep B", "</plan>\ndone"]);
        assert_eq!(
            out,
            vec![
                Segment::Text("plan:".into()),
                Segment::Plan("step A\nstep B".into()),
                Segment::Text("done".into()),
            ]
        );
    }

    #[test]
    fn markers_split_mid_token() {
        let out = run(&["Here <pl", "an> one\ntwo </pl", "an> ok"]);
        assert_eq!(
            out,
            vec![
                Segment::Text("Here".into()),
                Segment::Plan("one\ntwo".into()),
                Segment::Text("ok".into()),
            ]
        );
    }

    #[test]
    fn whitespace_before_marker_in_earlier_chunk_is_trimmed() {
        let out = run(&["plan:\n", "<plan>a</plan>"]);
        assert_eq!(
            out,
            vec![Segment::Text("plan:".into()), Segment::Plan("a".into())]
        );
    }

    #[test]
    fn plain_text_streams_through() {
        let mut detector = PlanDetector::new();
        assert_eq!(detector.push("Hello"), vec![Segment::Text("Hello".into())]);
        assert_eq!(detector.push(" wor"), vec![Segment::Text(" wor".into())]);
        // A possible marker start is held until the next chunk decides it
        assert_eq!(detector.push("ld <"), vec![Segment::Text("ld".into())]);
        assert_eq!(detector.push("3"), vec![Segment::Text(" <3".into())]);
        assert!(detector.finish().is_empty());
    }

    #[test]
    fn no_pre_marker_flush_when_only_whitespace() {
        let out = run(&["  \n<plan>x</plan>"]);
        assert_eq!(out, vec![Segment::Plan("x".into())]);
    }

    #[test]
    fn unterminated_plan_flushes_as_text() {
        let out = run(&["intro <plan>step 1", "\nstep 2"]);
        assert_eq!(
            out,
            vec![
                Segment::Text("intro".into()),
                Segment::Text("<plan>step 1\nstep 2".into()),
            ]
        );
    }

    #[test]
    fn flush_text_releases_held_prefix() {
        let mut detector = PlanDetector::new();
        assert_eq!(detector.push("see <p"), vec![Segment::Text("see".into())]);
        assert_eq!(detector.flush_text(), vec![Segment::Text(" <p".into())]);
        assert!(!detector.in_plan());
    }

    #[test]
    fn partial_suffix_lengths() {
        assert_eq!(partial_marker_len("abc<", OPEN_MARKER), 1);
        assert_eq!(partial_marker_len("abc<pla", OPEN_MARKER), 4);
        assert_eq!(partial_marker_len("abc", OPEN_MARKER), 0);
        assert_eq!(partial_marker_len("x</", CLOSE_MARKER), 2);
        assert_eq!(partial_marker_len("é<", OPEN_MARKER), 1);
    }
}
