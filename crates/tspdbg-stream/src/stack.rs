//! Call-stack block reassembly and decoding.
//!
//! A completed block has the shape
//!
//! ```text
//! <stacks>
//!   <stack level="0" currentline="3" name="main chunk">
//!     <globals><variable name="x" value="10" type="number"/></globals>
//!     <locals>…</locals>
//!     <upvalues>…</upvalues>
//!     <watchpoints><watchpoint expression="a" value="20" type="number"/></watchpoints>
//!   </stack>
//! </stacks>
//! ```
//!
//! Any of the four groups may be missing or empty.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::entities::decode_entities;
use crate::error::DecodeError;
use crate::markers::{ContinuationFilter, Markers};
use crate::model::{Frame, Scope, StackSnapshot, VarType, Variable, Watchpoint};
use crate::reassembler::BlockReassembler;
use crate::table::reconstruct;

/// Reassembles stack blocks and decodes them into snapshots.
#[derive(Debug, Clone)]
pub struct StackReassembler {
    blocks: BlockReassembler,
    continuation: ContinuationFilter,
}

impl StackReassembler {
    pub fn new(markers: &Markers) -> Self {
        Self {
            blocks: BlockReassembler::new(markers.stack_open.clone(), markers.stack_close.clone()),
            continuation: ContinuationFilter::new(&markers.continuation),
        }
    }

    /// Whether a stack block is currently being accumulated.
    pub fn is_started(&self) -> bool {
        self.blocks.is_started()
    }

    /// Whether the last push completed at least one block.
    pub fn is_completed(&self) -> bool {
        self.blocks.is_completed()
    }

    pub fn reset(&mut self) {
        self.blocks.reset();
        self.continuation.reset();
    }

    /// Feed a chunk and return a snapshot for every block it completed.
    ///
    /// Blocks that fail to decode are logged and skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<StackSnapshot> {
        let chunk = self.continuation.filter(chunk);
        self.blocks
            .push(&chunk)
            .into_iter()
            .filter_map(|block| match decode_stacks(&block) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("Dropping undecodable stack block: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Decode one complete `<stacks>…</stacks>` block.
///
/// Frames are returned ordered by ascending level.
pub fn decode_stacks(block: &str) -> Result<StackSnapshot, DecodeError> {
    if !block.contains("</stacks>") {
        return Err(DecodeError::Truncated("stacks"));
    }

    let mut reader = Reader::from_str(block);
    reader.config_mut().trim_text(true);
    let mut decoder = StackDecoder::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => decoder.on_start(e, false)?,
            Ok(Event::Empty(ref e)) => decoder.on_start(e, true)?,
            Ok(Event::End(ref e)) => {
                if decoder.on_end(e.name().as_ref())? {
                    break;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DecodeError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    decoder.finish()
}

#[derive(Debug, Clone, Copy)]
enum Group {
    Variables(Scope),
    Watchpoints,
}

impl Group {
    fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"globals" => Some(Group::Variables(Scope::Globals)),
            b"locals" => Some(Group::Variables(Scope::Locals)),
            b"upvalues" => Some(Group::Variables(Scope::Upvalues)),
            b"watchpoints" => Some(Group::Watchpoints),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct StackDecoder {
    frames: Vec<Frame>,
    current: Option<Frame>,
    group: Option<Group>,
    closed: bool,
}

impl StackDecoder {
    fn on_start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), DecodeError> {
        let name = e.name();
        let name = name.as_ref();
        if name == b"stack" {
            self.finish_frame()?;
            let attrs = Attrs::collect(e)?;
            let level = attrs.number("stack", "level")?;
            let current_line = attrs.number("stack", "currentline")?;
            let frame_name = attrs.get("name").unwrap_or_default();
            self.current = Some(Frame::new(level, current_line, frame_name));
            if empty {
                self.finish_frame()?;
            }
        } else if let Some(group) = Group::from_element(name) {
            if !empty {
                self.group = Some(group);
            }
        } else if name == b"variable" {
            self.on_variable(e)?;
        } else if name == b"watchpoint" {
            self.on_watchpoint(e)?;
        }
        Ok(())
    }

    /// Returns true once the root element has closed.
    fn on_end(&mut self, name: &[u8]) -> Result<bool, DecodeError> {
        match name {
            b"stacks" => {
                self.closed = true;
                Ok(true)
            }
            b"stack" => {
                self.finish_frame()?;
                Ok(false)
            }
            other => {
                if Group::from_element(other).is_some() {
                    self.group = None;
                }
                Ok(false)
            }
        }
    }

    fn on_variable(&mut self, e: &BytesStart<'_>) -> Result<(), DecodeError> {
        let (Some(frame), Some(Group::Variables(scope))) = (self.current.as_mut(), self.group)
        else {
            return Ok(());
        };
        let attrs = Attrs::collect(e)?;
        let name = attrs.require("variable", "name")?.to_string();
        let value = attrs.get("value").unwrap_or_default().to_string();
        let var_type = VarType::from(attrs.get("type").unwrap_or("nil"));

        let node = if var_type == VarType::Table {
            match reconstruct(&name, &value, &[]) {
                Ok(node) => Some(node),
                Err(e) => {
                    warn!("Table variable {} has an unreadable payload: {}", name, e);
                    None
                }
            }
        } else {
            None
        };

        frame.variables_mut(scope).push(Variable {
            name,
            value,
            var_type,
            node,
        });
        Ok(())
    }

    fn on_watchpoint(&mut self, e: &BytesStart<'_>) -> Result<(), DecodeError> {
        let (Some(frame), Some(Group::Watchpoints)) = (self.current.as_mut(), self.group) else {
            return Ok(());
        };
        let attrs = Attrs::collect(e)?;
        frame.watchpoints.push(Watchpoint {
            expression: attrs.require("watchpoint", "expression")?.to_string(),
            value: attrs.get("value").unwrap_or_default().to_string(),
            var_type: VarType::from(attrs.get("type").unwrap_or("nil")),
        });
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<(), DecodeError> {
        self.group = None;
        let Some(frame) = self.current.take() else {
            return Ok(());
        };
        if self.frames.iter().any(|f| f.level == frame.level) {
            return Err(DecodeError::DuplicateLevel(frame.level));
        }
        self.frames.push(frame);
        Ok(())
    }

    fn finish(mut self) -> Result<StackSnapshot, DecodeError> {
        if !self.closed {
            return Err(DecodeError::Truncated("stacks"));
        }
        self.finish_frame()?;
        self.frames.sort_by_key(|f| f.level);
        Ok(StackSnapshot {
            frames: self.frames,
        })
    }
}

/// Decoded attributes of one element.
struct Attrs(Vec<(Vec<u8>, String)>);

impl Attrs {
    fn collect(e: &BytesStart<'_>) -> Result<Self, DecodeError> {
        let mut pairs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| DecodeError::Xml(e.to_string()))?;
            let raw = String::from_utf8_lossy(&attr.value);
            pairs.push((attr.key.as_ref().to_vec(), decode_entities(&raw)));
        }
        Ok(Self(pairs))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.as_slice() == key.as_bytes())
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, element: &'static str, attribute: &'static str) -> Result<&str, DecodeError> {
        self.get(attribute)
            .ok_or(DecodeError::MissingAttribute { element, attribute })
    }

    fn number(&self, element: &'static str, attribute: &'static str) -> Result<u32, DecodeError> {
        let raw = self.require(element, attribute)?;
        raw.trim()
            .parse()
            .map_err(|_| DecodeError::InvalidAttribute {
                element,
                attribute,
                value: raw.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeValue;

    const SAMPLE: &str = concat!(
        "<stacks>",
        "<stack level=\"1\" currentline=\"12\" name=\"outer\">",
        "<globals><variable name=\"g\" value=\"1\" type=\"number\"/></globals>",
        "<locals/><upvalues></upvalues>",
        "<watchpoints><watchpoint expression=\"a\" value=\"30\" type=\"number\"/></watchpoints>",
        "</stack>",
        "<stack level=\"0\" currentline=\"3\" name=\"main chunk\">",
        "<locals>",
        "<variable name=\"mainTab\" value=\"{&quot;table&quot;:[{&quot;name&quot;:&quot;B&quot;,&quot;value&quot;:34},{&quot;name&quot;:&quot;F&quot;,&quot;value&quot;:56}]}\" type=\"table\"/>",
        "<variable name=\"s\" value=\"a &lt; b\" type=\"string\"/>",
        "</locals>",
        "<watchpoints><watchpoint expression=\"a\" value=\"20\" type=\"number\"/></watchpoints>",
        "</stack>",
        "</stacks>",
    );

    #[test]
    fn decode_orders_frames_by_level() {
        let snapshot = decode_stacks(SAMPLE).unwrap();
        let levels: Vec<_> = snapshot.frames.iter().map(|f| f.level).collect();
        assert_eq!(levels, vec![0, 1]);
        assert_eq!(snapshot.top().unwrap().name, "main chunk");
        assert_eq!(snapshot.frame(1).unwrap().current_line, 12);
    }

    #[test]
    fn decode_groups_and_entities() {
        let snapshot = decode_stacks(SAMPLE).unwrap();
        let top = snapshot.frame(0).unwrap();
        assert!(top.globals.is_empty());
        assert_eq!(top.locals.len(), 2);
        assert_eq!(top.locals[1].value, "a < b");
        assert_eq!(top.locals[1].var_type, VarType::String);

        let outer = snapshot.frame(1).unwrap();
        assert_eq!(outer.variables(Scope::Globals)[0].name, "g");
        assert!(outer.locals.is_empty());
        assert!(outer.upvalues.is_empty());
    }

    #[test]
    fn decode_watchpoints_per_frame() {
        let snapshot = decode_stacks(SAMPLE).unwrap();
        assert_eq!(snapshot.frame(0).unwrap().watchpoint("a").unwrap().value, "20");
        assert_eq!(snapshot.frame(1).unwrap().watchpoint("a").unwrap().value, "30");
    }

    #[test]
    fn table_variables_are_reconstructed() {
        let snapshot = decode_stacks(SAMPLE).unwrap();
        let table = &snapshot.frame(0).unwrap().locals[0];
        assert_eq!(table.var_type, VarType::Table);
        let node = table.node.as_ref().unwrap();
        assert_eq!(node.path, vec!["mainTab".to_string()]);
        let children = node.children();
        assert_eq!(children[0].name, "\"B\"");
        assert_eq!(children[0].value, NodeValue::Scalar("34".into()));
        assert_eq!(children[1].name, "\"F\"");
        assert_eq!(children[1].scalar(), Some("56"));
    }

    #[test]
    fn unreadable_table_payload_keeps_raw_value() {
        let block = "<stacks><stack level=\"0\" currentline=\"1\" name=\"m\"><locals>\
                     <variable name=\"t\" value=\"not json\" type=\"table\"/></locals></stack></stacks>";
        let snapshot = decode_stacks(block).unwrap();
        let var = &snapshot.frame(0).unwrap().locals[0];
        assert_eq!(var.value, "not json");
        assert!(var.node.is_none());
    }

    #[test]
    fn missing_groups_decode_empty() {
        let snapshot =
            decode_stacks("<stacks><stack level=\"0\" currentline=\"9\" name=\"f\"/></stacks>")
                .unwrap();
        let frame = snapshot.frame(0).unwrap();
        assert!(frame.watchpoints.is_empty());
        assert!(frame.locals.is_empty());
        assert_eq!(frame.current_line, 9);
    }

    #[test]
    fn empty_stacks_block_has_no_frames() {
        assert_eq!(decode_stacks("<stacks></stacks>").unwrap(), StackSnapshot::default());
    }

    #[test]
    fn duplicate_level_is_rejected() {
        let block = "<stacks><stack level=\"0\" currentline=\"1\" name=\"a\"/>\
                     <stack level=\"0\" currentline=\"2\" name=\"b\"></stack></stacks>";
        assert_eq!(decode_stacks(block), Err(DecodeError::DuplicateLevel(0)));
    }

    #[test]
    fn missing_or_invalid_level_is_rejected() {
        let missing = "<stacks><stack currentline=\"1\" name=\"a\"/></stacks>";
        assert_eq!(
            decode_stacks(missing),
            Err(DecodeError::MissingAttribute {
                element: "stack",
                attribute: "level",
            })
        );
        let invalid = "<stacks><stack level=\"top\" currentline=\"1\" name=\"a\"/></stacks>";
        assert!(matches!(
            decode_stacks(invalid),
            Err(DecodeError::InvalidAttribute { attribute: "level", .. })
        ));
    }

    #[test]
    fn truncated_block_is_rejected() {
        assert_eq!(
            decode_stacks("<stacks><stack level=\"0\" currentline=\"1\" name=\"a\"/>"),
            Err(DecodeError::Truncated("stacks"))
        );
    }

    #[test]
    fn every_split_offset_yields_the_same_snapshot() {
        let expected = decode_stacks(SAMPLE).unwrap();
        let stream = format!("output before{SAMPLE}output after");
        for split in 0..=stream.len() {
            let mut r = StackReassembler::new(&Markers::default());
            let mut snapshots = r.push(&stream[..split]);
            snapshots.extend(r.push(&stream[split..]));
            assert_eq!(snapshots, vec![expected.clone()], "split at {split}");
        }
    }

    #[test]
    fn back_to_back_blocks_in_one_chunk() {
        let mut r = StackReassembler::new(&Markers::default());
        let first = "<stacks><stack level=\"0\" currentline=\"1\" name=\"a\"/></stacks>";
        let second = "<stacks><stack level=\"0\" currentline=\"2\" name=\"a\"/></stacks>";
        let snapshots = r.push(&format!("{first}{second}"));
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].frame(0).unwrap().current_line, 2);
        assert!(r.is_completed());
    }

    #[test]
    fn continuation_markers_inside_block_are_ignored() {
        let mut r = StackReassembler::new(&Markers::default());
        assert!(r.push("<stacks><stack level=\"0\" curr\n>>>>").is_empty());
        assert!(r.is_started());
        let snapshots = r.push("entline=\"4\" name=\"a\"/></stacks>");
        assert_eq!(snapshots[0].frame(0).unwrap().current_line, 4);
    }

    #[test]
    fn continuation_marker_split_across_chunks_is_ignored() {
        let mut r = StackReassembler::new(&Markers::default());
        assert!(r.push("<stacks><stack level=\"0\" curr\n>>").is_empty());
        let snapshots = r.push(">>entline=\"6\" name=\"a\"/></stacks>");
        assert_eq!(snapshots[0].frame(0).unwrap().current_line, 6);
    }

    #[test]
    fn undecodable_block_is_skipped() {
        let mut r = StackReassembler::new(&Markers::default());
        let snapshots = r.push("<stacks><stack name=\"no level\"/></stacks>");
        assert!(snapshots.is_empty());
        assert!(r.is_completed());
    }
}
