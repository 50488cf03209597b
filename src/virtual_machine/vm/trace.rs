use crate::micheline::Prim;
use std::fmt;

/// One executed instruction with the items it consumed and produced, top first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub prim: Prim,
    pub consumed: Vec<String>,
    pub produced: Vec<String>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} => {}",
            self.prim,
            self.consumed.join(" : "),
            self.produced.join(" : ")
        )
    }
}

/// Receiver of trace entries.
pub trait TraceSink {
    fn record(&mut self, entry: TraceEntry);
}

impl TraceSink for Vec<TraceEntry> {
    fn record(&mut self, entry: TraceEntry) {
        self.push(entry);
    }
}
