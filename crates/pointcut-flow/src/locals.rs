//! Reconstruction of the local variables live at an instruction.

use std::sync::Arc;

use pointcut_classfile::opcodes::{is_local_load, is_local_store, DLOAD, DSTORE, LLOAD, LSTORE};
use pointcut_classfile::{
    parse_method_descriptor, FieldType, FrameKind, FrameNode, FrameValue, Insn, InsnId, MethodNode,
};
use pointcut_core::{CancellationToken, Cancelled};
use thiserror::Error;

use crate::analyzer::Frames;
use crate::settings::LocalsSettings;
use crate::value::TypeValue;

const CANCEL_CHECK_INTERVAL: usize = 64;

/// How far a query on a label or line number may move forward.
const MAX_QUERY_SKIP: usize = 3;

/// A local variable valid over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVariable {
    pub name: String,
    pub desc: String,
    pub index: u16,
    pub start: InsnId,
    pub end: InsnId,
}

impl LocalVariable {
    pub fn contains(&self, at: InsnId) -> bool {
        self.start <= at && at < self.end
    }

    pub fn size(&self) -> usize {
        if self.desc == "J" || self.desc == "D" {
            2
        } else {
            1
        }
    }

    fn span(&self) -> usize {
        self.end.index().saturating_sub(self.start.index())
    }

    /// Distance from `at` to the closest end of the range; zero when enclosed.
    fn distance(&self, at: InsnId) -> usize {
        if at < self.start {
            self.start.index() - at.index()
        } else if at >= self.end {
            at.index() + 1 - self.end.index()
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalsError {
    #[error("local variable information unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// The method's `LocalVariableTable`, with label ranges resolved to positions.
/// Entries referencing missing labels are dropped.
pub fn declared_table(method: &MethodNode) -> Vec<LocalVariable> {
    let insns = &method.instructions;
    method
        .local_variables
        .iter()
        .filter_map(|node| {
            Some(LocalVariable {
                name: node.name.clone(),
                desc: node.desc.clone(),
                index: node.index,
                start: insns.label_position(node.start)?,
                end: insns.label_position(node.end)?,
            })
        })
        .collect()
}

/// Derives a local table from analysis frames.
///
/// A slot value appearing starts a variable named `var<N>`; a value
/// disappearing or changing ends it. Values without a descriptor of their own
/// inherit the slot's last known type.
pub fn generate_table(method: &MethodNode, frames: &Frames) -> Vec<LocalVariable> {
    let max_locals = method.max_locals as usize;
    let mut open: Vec<Option<(InsnId, String)>> = vec![None; max_locals];
    let mut current: Vec<Option<TypeValue>> = vec![None; max_locals];
    let mut last_known: Vec<Option<String>> = vec![None; max_locals];
    let mut table = Vec::new();

    for (at, frame) in frames.iter() {
        let Some(frame) = frame else { continue };
        for slot in 0..frame.locals.len().min(max_locals) {
            let value = match &frame.locals[slot] {
                TypeValue::Uninitialized => None,
                other => Some(other),
            };
            if value == current[slot].as_ref() {
                continue;
            }
            if let Some((start, desc)) = open[slot].take() {
                table.push(generated(slot, desc, start, at));
            }
            if let Some(value) = value {
                let desc = value.descriptor().or_else(|| last_known[slot].clone());
                if let Some(desc) = desc {
                    last_known[slot] = Some(desc.clone());
                    open[slot] = Some((at, desc));
                }
            }
            current[slot] = value.cloned();
        }
    }

    let end = InsnId::new(method.instructions.len());
    for (slot, entry) in open.into_iter().enumerate() {
        if let Some((start, desc)) = entry {
            table.push(generated(slot, desc, start, end));
        }
    }
    table.sort_by_key(|var| (var.start, var.index));
    table
}

fn generated(slot: usize, desc: String, start: InsnId, end: InsnId) -> LocalVariable {
    LocalVariable {
        name: format!("var{slot}"),
        desc,
        index: slot as u16,
        start,
        end,
    }
}

/// Live variables at an instruction, indexed by slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocalTable {
    slots: Vec<Option<LocalVariable>>,
}

impl LocalTable {
    pub fn get(&self, slot: usize) -> Option<&LocalVariable> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariable> + '_ {
        self.slots.iter().flatten()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&LocalVariable> {
        self.iter().find(|var| var.name == name)
    }
}

/// Why a slot was turned into a zombie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZombieCause {
    /// Removed by a `CHOP` (or expanded) frame.
    Chop,
    /// Missing from a frame that otherwise re-described the locals.
    Trim,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zombie {
    pub ancestor: LocalVariable,
    pub cause: ZombieCause,
    /// Instructions survived since removal.
    pub lifetime: u32,
    /// Frames survived since removal.
    pub frames: u32,
}

impl Zombie {
    fn can_resurrect(&self, settings: &LocalsSettings) -> bool {
        let (insns, frames) = match self.cause {
            ZombieCause::Chop => (
                settings.chopped_insn_threshold,
                settings.chopped_frame_threshold,
            ),
            ZombieCause::Trim => (
                settings.trimmed_insn_threshold,
                settings.trimmed_frame_threshold,
            ),
        };
        insns.map_or(true, |limit| self.lifetime <= limit)
            && frames.map_or(true, |limit| self.frames <= limit)
    }
}

/// Simulated state of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Live(LocalVariable),
    Zombie(Zombie),
    Unknown,
}

impl Slot {
    fn kill(self, cause: ZombieCause) -> Slot {
        match self {
            Slot::Live(ancestor) => Slot::Zombie(Zombie {
                ancestor,
                cause,
                lifetime: 0,
                frames: 0,
            }),
            other => other,
        }
    }
}

/// Everything needed to answer local-variable queries for one method.
#[derive(Debug, Clone)]
pub struct LocalsContext<'a> {
    owner: &'a str,
    method: &'a MethodNode,
    declared: Vec<LocalVariable>,
    generated: Option<Arc<[LocalVariable]>>,
    settings: LocalsSettings,
}

impl<'a> LocalsContext<'a> {
    pub fn new(
        owner: &'a str,
        method: &'a MethodNode,
        generated: Option<Arc<[LocalVariable]>>,
        settings: LocalsSettings,
    ) -> Self {
        Self {
            owner,
            method,
            declared: declared_table(method),
            generated,
            settings,
        }
    }

    pub fn method(&self) -> &'a MethodNode {
        self.method
    }

    pub fn settings(&self) -> &LocalsSettings {
        &self.settings
    }

    /// The table lookups are answered from: declared if present, else synthesized.
    pub fn table(&self) -> &[LocalVariable] {
        if !self.declared.is_empty() {
            &self.declared
        } else {
            self.generated.as_deref().unwrap_or(&[])
        }
    }

    /// The variable occupying `slot` at `at`.
    ///
    /// Declared ranges win (narrowest enclosing first); gaps are filled from
    /// the synthesized table; failing both, the nearest declared range for the
    /// slot is returned even though it does not enclose `at`.
    pub fn variable_at(&self, at: InsnId, slot: u16) -> Option<LocalVariable> {
        let narrowest = |table: &[LocalVariable]| {
            table
                .iter()
                .filter(|var| var.index == slot && var.contains(at))
                .min_by_key(|var| var.span())
                .cloned()
        };

        if self.declared.is_empty() {
            return narrowest(self.generated.as_deref()?);
        }
        narrowest(&self.declared)
            .or_else(|| self.generated.as_deref().and_then(narrowest))
            .or_else(|| {
                self.declared
                    .iter()
                    .filter(|var| var.index == slot)
                    .min_by_key(|var| var.distance(at))
                    .cloned()
            })
    }
}

/// Locals live immediately before `at` executes, by simulating loads, stores
/// and stack-map frames from the start of the method.
pub fn locals_at(
    ctx: &LocalsContext<'_>,
    at: InsnId,
    cancel: &CancellationToken,
) -> Result<LocalTable, LocalsError> {
    if ctx.declared.is_empty() && ctx.generated.is_none() {
        return Err(LocalsError::Unavailable(format!(
            "{}.{}{} has no local variable table and could not be analysed",
            ctx.owner, ctx.method.name, ctx.method.desc
        )));
    }
    let insns = &ctx.method.instructions;
    if insns.get(at).is_none() {
        return Err(LocalsError::Unavailable(format!("{at} is outside the method")));
    }
    let desc = parse_method_descriptor(&ctx.method.desc)
        .map_err(|err| LocalsError::Unavailable(err.to_string()))?;

    let query = skip_pseudo_nodes(ctx.method, at);

    let mut sim = Simulation {
        ctx,
        frame: Vec::new(),
        initial_size: 0,
        frame_size: 0,
        last_frame_size: 0,
    };
    sim.seed(&desc.params);

    let mut pending_store: Option<u16> = None;
    for (id, insn) in insns.iter() {
        if id.index() % CANCEL_CHECK_INTERVAL == 0 {
            Cancelled::check(cancel)?;
        }

        let is_frame = insn.is_frame();
        for slot in sim.frame.iter_mut() {
            if let Slot::Zombie(zombie) = slot {
                zombie.lifetime += 1;
                if is_frame {
                    zombie.frames += 1;
                }
            }
        }

        // Stores take effect after their instruction, so the state reported
        // for an instruction is always the one it observes.
        if let Some(var) = pending_store.take() {
            if let Some(slot) = sim.frame.get_mut(var as usize) {
                *slot = ctx.variable_at(id, var).map_or(Slot::Unknown, Slot::Live);
            }
        }

        match insn {
            Insn::Frame(node) => sim.apply_frame(id, node),
            Insn::Var { opcode, var } if is_local_load(*opcode) => sim.load(id, *opcode, *var),
            Insn::Var { opcode, var } if is_local_store(*opcode) => {
                pending_store = Some(*var);
                sim.store(*opcode, *var);
            }
            _ => {}
        }

        if id == query {
            break;
        }
    }

    Ok(sim.finish())
}

/// Moves a query on a label or line number forward to the instruction it
/// introduces, never past a frame.
fn skip_pseudo_nodes(method: &MethodNode, mut at: InsnId) -> InsnId {
    let insns = &method.instructions;
    for _ in 0..MAX_QUERY_SKIP {
        if !matches!(insns[at], Insn::Label(_) | Insn::LineNumber { .. }) {
            break;
        }
        match insns.next(at) {
            Some(next) if !insns[next].is_frame() => at = next,
            _ => break,
        }
    }
    at
}

struct Simulation<'c, 'a> {
    ctx: &'c LocalsContext<'a>,
    frame: Vec<Slot>,
    /// Slots taken by `this` and the parameters.
    initial_size: usize,
    /// Slots currently known to be part of the frame.
    frame_size: usize,
    /// `frame_size` as of the last non-`SAME` frame.
    last_frame_size: usize,
}

impl Simulation<'_, '_> {
    fn seed(&mut self, params: &[FieldType]) {
        let method = self.ctx.method;
        let first = InsnId::new(0);
        let end = InsnId::new(method.instructions.len());
        let arg_slots: usize = params.iter().map(|p| p.slot_size()).sum();
        let this_slots = usize::from(!method.is_static());
        let size = (method.max_locals as usize).max(arg_slots + this_slots);
        self.frame = vec![Slot::Unknown; size];

        let mut local = 0usize;
        let implicit = |local: usize, name: String, desc: String| {
            self.ctx
                .variable_at(first, local as u16)
                .unwrap_or(LocalVariable {
                    name,
                    desc,
                    index: local as u16,
                    start: first,
                    end,
                })
        };
        let mut seeded = Vec::new();
        if this_slots == 1 {
            seeded.push((0, implicit(0, "this".to_string(), format!("L{};", self.ctx.owner))));
            local = 1;
        }
        for (idx, param) in params.iter().enumerate() {
            seeded.push((local, implicit(local, format!("arg{idx}"), param.descriptor())));
            local += param.slot_size();
        }
        for (slot, var) in seeded {
            self.frame[slot] = Slot::Live(var);
        }
        self.initial_size = local;
        self.frame_size = local;
        self.last_frame_size = local;
    }

    fn apply_frame(&mut self, at: InsnId, node: &FrameNode) {
        let previous_size = self.last_frame_size;
        // Frame nodes carry the complete expanded locals, so every directive
        // that touches locals states the frame size outright.
        self.frame_size = match node.kind {
            FrameKind::Same | FrameKind::Same1 => return,
            FrameKind::Append(_) | FrameKind::Chop(_) | FrameKind::Full | FrameKind::New => {
                self.initial_size.max(node.local_slots())
            }
        };

        if matches!(node.kind, FrameKind::Chop(_) | FrameKind::New) {
            for pos in self.frame_size..self.frame.len() {
                self.kill(pos, ZombieCause::Chop);
            }
            self.last_frame_size = self.frame_size;
            return;
        }

        let mut pos = match node.kind {
            FrameKind::Append(_) => previous_size,
            _ => 0,
        };
        self.last_frame_size = self.frame_size;

        while pos < self.frame.len() {
            match node.locals.get(pos) {
                Some(FrameValue::Object(_) | FrameValue::Integer | FrameValue::Float) => {
                    self.retype(at, pos);
                }
                Some(FrameValue::Long | FrameValue::Double) => {
                    self.retype(at, pos);
                    if let Some(high) = self.frame.get_mut(pos + 1) {
                        *high = Slot::Unknown;
                    }
                    pos += 1;
                }
                Some(FrameValue::Top) => {
                    let revived = match &self.frame[pos] {
                        Slot::Zombie(zombie)
                            if self.ctx.settings.bogus_top && zombie.cause == ZombieCause::Trim =>
                        {
                            Some(zombie.ancestor.clone())
                        }
                        _ => None,
                    };
                    if let Some(ancestor) = revived {
                        tracing::debug!(
                            target: "pointcut.flow.locals",
                            slot = pos,
                            name = %ancestor.name,
                            "resurrecting trimmed local marked top"
                        );
                        self.frame[pos] = Slot::Live(ancestor);
                    }
                }
                Some(FrameValue::Null | FrameValue::UninitializedThis) => {
                    self.frame[pos] = Slot::Unknown;
                }
                Some(FrameValue::Uninitialized(_)) => {}
                None => {
                    if pos >= self.initial_size && pos >= self.frame_size && self.frame_size > 0 {
                        let cause = if pos < previous_size {
                            ZombieCause::Chop
                        } else {
                            ZombieCause::Trim
                        };
                        self.kill(pos, cause);
                    }
                }
            }
            pos += 1;
        }
    }

    fn retype(&mut self, at: InsnId, pos: usize) {
        self.frame[pos] = self
            .ctx
            .variable_at(at, pos as u16)
            .map_or(Slot::Unknown, Slot::Live);
    }

    fn kill(&mut self, pos: usize, cause: ZombieCause) {
        let slot = std::mem::replace(&mut self.frame[pos], Slot::Unknown);
        self.frame[pos] = slot.kill(cause);
    }

    fn load(&mut self, at: InsnId, opcode: u8, var: u16) {
        let settings = self.ctx.settings;
        let pos = var as usize;
        let Some(current) = self.frame.get(pos) else {
            return;
        };
        let slot = match self.ctx.variable_at(at, var) {
            Some(found) => Slot::Live(found),
            None => match current {
                Slot::Zombie(zombie)
                    if settings.exposed_on_load && zombie.can_resurrect(&settings) =>
                {
                    Slot::Live(zombie.ancestor.clone())
                }
                _ => Slot::Unknown,
            },
        };
        let size = match &slot {
            Slot::Live(var) => var.size(),
            _ => wide_opcode_size(opcode),
        };
        self.frame[pos] = slot;
        self.frame_size = self.frame_size.max(pos + size);
        if settings.exposed_on_load {
            self.resurrect();
        }
    }

    fn store(&mut self, opcode: u8, var: u16) {
        let settings = self.ctx.settings;
        if settings.exposed_on_store {
            self.frame_size = self
                .frame_size
                .max(var as usize + wide_opcode_size(opcode));
            self.resurrect();
        }
    }

    /// Brings back zombies inside the known frame that are still within their
    /// thresholds.
    fn resurrect(&mut self) {
        let settings = self.ctx.settings;
        let limit = self.frame_size.min(self.frame.len());
        for (pos, slot) in self.frame[..limit].iter_mut().enumerate() {
            let revived = match &*slot {
                Slot::Zombie(zombie) if zombie.can_resurrect(&settings) => {
                    tracing::debug!(
                        target: "pointcut.flow.locals",
                        slot = pos,
                        name = %zombie.ancestor.name,
                        lifetime = zombie.lifetime,
                        frames = zombie.frames,
                        "resurrecting exposed local"
                    );
                    zombie.ancestor.clone()
                }
                _ => continue,
            };
            *slot = Slot::Live(revived);
        }
    }

    fn finish(self) -> LocalTable {
        let slots = self
            .frame
            .into_iter()
            .map(|slot| match slot {
                Slot::Live(var) => Some(var),
                // Zombies culled by the frame right before the query (or by
                // the query node itself) still count.
                Slot::Zombie(zombie) if zombie.lifetime <= 1 => Some(zombie.ancestor),
                Slot::Zombie(_) | Slot::Unknown => None,
            })
            .collect();
        LocalTable { slots }
    }
}

fn wide_opcode_size(opcode: u8) -> usize {
    if matches!(opcode, LLOAD | DLOAD | LSTORE | DSTORE) {
        2
    } else {
        1
    }
}
