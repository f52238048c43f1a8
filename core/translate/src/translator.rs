//! Function-body translator: a single-pass stack-polymorphic validator and
//! JavaScript emitter.
//!
//! Each body is walked opcode by opcode. The translator keeps a symbolic
//! operand stack partitioned by numeric type and a structured control-flow
//! stack, and emits one statement per opcode over per-type virtual
//! registers. Locals are `li<n>`/`ll<n>`/`lf<n>`/`ld<n>` by local slot;
//! operand slots are `si<h>`/`sl<h>`/`sf<h>`/`sd<h>` where `h` counts the
//! same-typed items below the slot across all open frames, which makes every
//! (type, depth) pair a deterministic, collision-free name. Declarations are
//! hoisted into a per-body header and flushed when the body closes.
//!
//! Structured control flow lowers to labeled JavaScript:
//! `block` → `L<k>: do {...} while (0)`, `loop` → `L<k>: while (1) {...}`,
//! `if`/`else` → `L<k>: do { if (c) {...} else {...} } while (0)`; branches
//! become `break`/`continue` on the target label, and a branch to the
//! function-entry sentinel becomes `return`. Code after an unconditional
//! transfer still validates against a polymorphic stack but emits nothing
//! beyond a single `trap('dead code')` stub.

use rustc_hash::FxHashSet;

use crate::errors::{DecodeError, TranslateError, ValidateError};
use crate::opcodes::{op, typetags};
use crate::reader::BytesReader;
use crate::types::{FuncSig, PAGE_SIZE, ParseResult, StackType, ValType};

const MAX_LOCALS: usize = 100_000;

/// One translated body plus the type indices its `call_indirect` sites used.
#[derive(Debug)]
pub(crate) struct TranslatedBody {
    pub(crate) text: String,
    pub(crate) indirect_type_indices: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Func,
    Block,
    Loop,
    If,
    Else,
}

struct Frame {
    kind: FrameKind,
    signature: Option<ValType>,
    label: u32,
    is_dead: bool,
    is_polymorphic: bool,
    end_reached: bool,
    /// Dead state of the enclosing code when this frame opened; the opening
    /// and closing lines are emitted iff this is false.
    head_dead: bool,
    dead_stub_emitted: bool,
    stack: Vec<StackType>,
    /// Per-type counts of operands live below this frame at creation.
    prev_heights: [usize; 4],
}

/// Translates one function body into a JavaScript function definition.
pub(crate) fn translate_function(
    module: &ParseResult,
    func_index: u32,
    body: &[u8],
) -> Result<TranslatedBody, TranslateError> {
    let sig = module.func_sig(func_index)?.clone();
    let mut t = FuncTranslator::new(module, func_index, sig, body)?;
    t.run()?;
    Ok(t.finish())
}

struct FuncTranslator<'m, 'b> {
    module: &'m ParseResult,
    func_index: u32,
    reader: BytesReader<'b>,
    sig: FuncSig,
    locals: Vec<ValType>,
    header: Vec<String>,
    declared: FxHashSet<String>,
    lines: Vec<String>,
    frames: Vec<Frame>,
    next_label: u32,
    indirect_type_indices: Vec<u32>,
}

impl<'m, 'b> FuncTranslator<'m, 'b> {
    fn new(
        module: &'m ParseResult,
        func_index: u32,
        sig: FuncSig,
        body: &'b [u8],
    ) -> Result<Self, TranslateError> {
        let mut reader = BytesReader::new(body);

        let mut locals: Vec<ValType> = sig.params.clone();
        let run_count = reader.read_var_u32()?;
        for _ in 0..run_count {
            let reps = reader.read_var_u32()? as usize;
            let offset = reader.pos();
            let tag = reader.read_var_s7()?;
            let ty = ValType::from_tag(tag, offset)?;
            if locals.len() + reps > MAX_LOCALS {
                return Err(DecodeError::Malformed {
                    offset,
                    message: "too many locals",
                }
                .into());
            }
            locals.extend(std::iter::repeat_n(ty, reps));
        }

        let mut declared = FxHashSet::default();
        for (i, ty) in sig.params.iter().enumerate() {
            declared.insert(local_name(*ty, i));
        }

        let entry = Frame {
            kind: FrameKind::Func,
            signature: sig.result,
            label: 0,
            is_dead: false,
            is_polymorphic: false,
            end_reached: false,
            head_dead: false,
            dead_stub_emitted: false,
            stack: Vec::new(),
            prev_heights: [0; 4],
        };

        Ok(FuncTranslator {
            module,
            func_index,
            reader,
            sig,
            locals,
            header: Vec::new(),
            declared,
            lines: Vec::new(),
            frames: vec![entry],
            next_label: 0,
            indirect_type_indices: Vec::new(),
        })
    }

    fn run(&mut self) -> Result<(), TranslateError> {
        while !self.frames.is_empty() {
            let offset = self.reader.pos();
            let opcode = self.reader.read_u8()?;
            self.step(opcode, offset)?;
        }
        if !self.reader.is_eof() {
            return Err(DecodeError::Malformed {
                offset: self.reader.pos(),
                message: "trailing bytes after function end",
            }
            .into());
        }
        Ok(())
    }

    fn finish(self) -> TranslatedBody {
        let mut text = String::new();
        text.push_str("function F");
        text.push_str(&self.func_index.to_string());
        text.push('(');
        for (i, ty) in self.sig.params.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            text.push_str(&local_name(*ty, i));
        }
        text.push_str(") {\n");
        for line in &self.header {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        for line in &self.lines {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("}\n");
        TranslatedBody {
            text,
            indirect_type_indices: self.indirect_type_indices,
        }
    }

    // ---- operand stack ----------------------------------------------------

    fn top(&self) -> &Frame {
        self.frames.last().expect("control stack is never empty")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("control stack is never empty")
    }

    /// Per-type operand counts across every open frame.
    fn cur_heights(&self) -> [usize; 4] {
        let top = self.top();
        let mut heights = top.prev_heights;
        for entry in &top.stack {
            if let StackType::Val(ty) = entry {
                heights[ty.idx()] += 1;
            }
        }
        heights
    }

    fn declare(&mut self, name: &str, ty: ValType) {
        if self.declared.insert(name.to_string()) {
            self.header
                .push(format!("var {name} = {};", ty.zero_literal()));
        }
    }

    /// Pushes a value of type `ty` and returns its register name.
    fn push(&mut self, ty: ValType) -> String {
        let name = stack_name(ty, self.cur_heights()[ty.idx()]);
        self.declare(&name, ty);
        self.top_mut().stack.push(StackType::Val(ty));
        name
    }

    fn push_unknown(&mut self) {
        self.top_mut().stack.push(StackType::Unknown);
    }

    /// Pops any slot, returning its type and register name. An empty stack
    /// in a polymorphic frame yields the UNREACHABLE sentinel.
    fn pop_any(&mut self) -> Result<(StackType, String), ValidateError> {
        let func = self.func_index;
        let polymorphic = self.top().is_polymorphic;
        let frame = self.top_mut();
        match frame.stack.pop() {
            Some(StackType::Val(ty)) => {
                let below = frame
                    .stack
                    .iter()
                    .filter(|e| **e == StackType::Val(ty))
                    .count();
                let name = stack_name(ty, frame.prev_heights[ty.idx()] + below);
                Ok((StackType::Val(ty), name))
            }
            Some(StackType::Unknown) => Ok((StackType::Unknown, "unreachable".to_string())),
            None if polymorphic => Ok((StackType::Unknown, "unreachable".to_string())),
            None => Err(ValidateError::StackUnderflow { func }),
        }
    }

    /// Pops a slot that must be of type `expect` (tolerated when the frame
    /// is polymorphic or the slot is UNKNOWN).
    fn pop(&mut self, expect: ValType) -> Result<String, ValidateError> {
        let polymorphic = self.top().is_polymorphic;
        let (ty, name) = self.pop_any()?;
        if let StackType::Val(found) = ty
            && found != expect
            && !polymorphic
        {
            return Err(ValidateError::StackTypeMismatch {
                func: self.func_index,
                expected: expect,
                found: StackType::Val(found),
            });
        }
        Ok(name)
    }

    /// Reads the slot `depth` entries below the top without removing it.
    fn peek(&self, expect: ValType, depth: usize) -> Result<String, ValidateError> {
        let frame = self.top();
        let len = frame.stack.len();
        if depth >= len {
            if frame.is_polymorphic {
                return Ok("unreachable".to_string());
            }
            return Err(ValidateError::StackUnderflow {
                func: self.func_index,
            });
        }
        let index = len - 1 - depth;
        match frame.stack[index] {
            StackType::Val(ty) => {
                if ty != expect && !frame.is_polymorphic {
                    return Err(ValidateError::StackTypeMismatch {
                        func: self.func_index,
                        expected: expect,
                        found: StackType::Val(ty),
                    });
                }
                let below = frame.stack[..index]
                    .iter()
                    .filter(|e| **e == StackType::Val(ty))
                    .count();
                Ok(stack_name(ty, frame.prev_heights[ty.idx()] + below))
            }
            StackType::Unknown => Ok("unreachable".to_string()),
        }
    }

    // ---- emission ---------------------------------------------------------

    /// Emits one statement, unless the current frame is dead; the first
    /// suppressed statement of a dead region leaves a single trap stub.
    fn stmt(&mut self, line: String) {
        let frame = self.top_mut();
        if frame.is_dead {
            if frame.dead_stub_emitted {
                return;
            }
            frame.dead_stub_emitted = true;
            self.lines.push("trap('dead code');".to_string());
            return;
        }
        self.lines.push(line);
    }

    /// Enters dead code: the frame turns polymorphic and its operands are
    /// discarded.
    fn mark_dead(&mut self) {
        let frame = self.top_mut();
        frame.is_dead = true;
        frame.is_polymorphic = true;
        frame.stack.clear();
    }

    // ---- control flow -----------------------------------------------------

    fn read_block_type(&mut self) -> Result<Option<ValType>, DecodeError> {
        let offset = self.reader.pos();
        let tag = self.reader.read_var_s7()?;
        if tag == typetags::NONE {
            Ok(None)
        } else {
            Ok(Some(ValType::from_tag(tag, offset)?))
        }
    }

    fn push_frame(&mut self, kind: FrameKind, signature: Option<ValType>, label: u32) {
        let head_dead = self.top().is_dead;
        let prev_heights = self.cur_heights();
        self.frames.push(Frame {
            kind,
            signature,
            label,
            is_dead: head_dead,
            is_polymorphic: false,
            end_reached: false,
            head_dead,
            dead_stub_emitted: false,
            stack: Vec::new(),
            prev_heights,
        });
    }

    fn fresh_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Pops the expected result off the closing frame and checks nothing
    /// else is left behind.
    fn close_stack(&mut self, expect: Option<ValType>) -> Result<(), ValidateError> {
        if let Some(ty) = expect {
            self.pop(ty)?;
        }
        let frame = self.top();
        if !frame.is_polymorphic && !frame.stack.is_empty() {
            return Err(ValidateError::UnbalancedBlock {
                func: self.func_index,
                remaining: frame.stack.len(),
            });
        }
        Ok(())
    }

    fn frame_at_depth(&self, depth: u32) -> Result<usize, ValidateError> {
        let frames = self.frames.len();
        frames
            .checked_sub(1 + depth as usize)
            .ok_or(ValidateError::BranchDepthOutOfRange {
                func: self.func_index,
                depth,
                frames,
            })
    }

    /// The type a branch to this frame carries: nothing for loops (the
    /// branch re-enters the frame head), the block signature otherwise.
    fn label_type(&self, target: usize) -> Option<ValType> {
        let frame = &self.frames[target];
        match frame.kind {
            FrameKind::Loop => None,
            _ => frame.signature,
        }
    }

    /// The statement transferring control to `target`, with the block-result
    /// copy folded in. `value` is the register holding the carried value.
    fn branch_stmt(&self, target: usize, value: Option<&str>) -> String {
        let frame = &self.frames[target];
        match frame.kind {
            FrameKind::Func => match (frame.signature, value) {
                (Some(_), Some(reg)) => format!("return {reg};"),
                _ => "return;".to_string(),
            },
            FrameKind::Loop => format!("continue L{};", frame.label),
            _ => {
                let label = frame.label;
                match (frame.signature, value) {
                    (Some(ty), Some(reg)) => {
                        let out = stack_name(ty, frame.prev_heights[ty.idx()]);
                        if out == reg {
                            format!("break L{label};")
                        } else {
                            format!("{out} = {reg}; break L{label};")
                        }
                    }
                    _ => format!("break L{label};"),
                }
            }
        }
    }

    fn op_block(&mut self) -> Result<(), TranslateError> {
        let signature = self.read_block_type()?;
        let label = self.fresh_label();
        self.stmt(format!("L{label}: do {{"));
        self.push_frame(FrameKind::Block, signature, label);
        Ok(())
    }

    fn op_loop(&mut self) -> Result<(), TranslateError> {
        let signature = self.read_block_type()?;
        let label = self.fresh_label();
        self.stmt(format!("L{label}: while (1) {{"));
        self.push_frame(FrameKind::Loop, signature, label);
        Ok(())
    }

    fn op_if(&mut self) -> Result<(), TranslateError> {
        let signature = self.read_block_type()?;
        let cond = self.pop(ValType::I32)?;
        let label = self.fresh_label();
        self.stmt(format!("L{label}: do {{ if ({cond}) {{"));
        self.push_frame(FrameKind::If, signature, label);
        Ok(())
    }

    fn op_else(&mut self, offset: usize) -> Result<(), TranslateError> {
        if self.top().kind != FrameKind::If {
            return Err(DecodeError::Malformed {
                offset,
                message: "`else` outside an `if` block",
            }
            .into());
        }
        let signature = self.top().signature;
        if !self.top().is_dead {
            self.close_stack(signature)?;
            self.top_mut().end_reached = true;
        }
        let frame = self.top_mut();
        frame.kind = FrameKind::Else;
        frame.stack.clear();
        frame.is_dead = frame.head_dead;
        frame.is_polymorphic = false;
        frame.dead_stub_emitted = false;
        self.stmt("} else {".to_string());
        Ok(())
    }

    fn op_end(&mut self) -> Result<(), TranslateError> {
        let kind = self.top().kind;
        let signature = self.top().signature;

        if kind == FrameKind::Func {
            if self.top().is_dead {
                self.close_stack(signature)?;
            } else {
                match signature {
                    Some(ty) => {
                        let value = self.pop(ty)?;
                        self.close_stack(None)?;
                        self.stmt(format!("return {value};"));
                    }
                    None => {
                        self.close_stack(None)?;
                        self.stmt("return;".to_string());
                    }
                }
            }
            self.frames.pop();
            return Ok(());
        }

        if kind == FrameKind::If && signature.is_some() {
            // The missing else arm could never produce the block result.
            return Err(ValidateError::IfMissingElse {
                func: self.func_index,
            }
            .into());
        }

        let fell_through = !self.top().is_dead;
        if fell_through {
            // Fallthrough leaves the result in the block's output register
            // by construction, so no copy is emitted here.
            self.close_stack(signature)?;
            if kind == FrameKind::Loop {
                let label = self.top().label;
                self.stmt(format!("break L{label};"));
            }
            self.top_mut().end_reached = true;
        } else {
            self.close_stack(signature)?;
        }

        let frame = self.frames.pop().expect("frame present at end");
        let closing = match frame.kind {
            FrameKind::Loop => "}",
            FrameKind::Block => "} while (0);",
            FrameKind::If | FrameKind::Else => "} } while (0);",
            FrameKind::Func => unreachable!("handled above"),
        };
        self.stmt(closing.to_string());

        if let Some(ty) = frame.signature {
            self.push(ty);
        }
        if !frame.end_reached {
            // No fallthrough and no branch targets this exit: whatever
            // follows in the parent is unreachable too.
            self.mark_dead();
        }
        Ok(())
    }

    fn op_br(&mut self, depth: u32) -> Result<(), TranslateError> {
        let target = self.frame_at_depth(depth)?;
        let label_type = self.label_type(target);
        let value = match label_type {
            Some(ty) => Some(self.pop(ty)?),
            None => None,
        };
        if !self.top().is_dead {
            let line = self.branch_stmt(target, value.as_deref());
            self.stmt(line);
            if self.frames[target].kind != FrameKind::Loop {
                self.frames[target].end_reached = true;
            }
        }
        self.mark_dead();
        Ok(())
    }

    fn op_br_if(&mut self, depth: u32) -> Result<(), TranslateError> {
        let cond = self.pop(ValType::I32)?;
        let target = self.frame_at_depth(depth)?;
        let label_type = self.label_type(target);
        // The carried value stays on the stack across a conditional branch.
        let value = match label_type {
            Some(ty) => Some(self.peek(ty, 0)?),
            None => None,
        };
        if !self.top().is_dead {
            let transfer = self.branch_stmt(target, value.as_deref());
            self.stmt(format!("if ({cond}) {{ {transfer} }}"));
            if self.frames[target].kind != FrameKind::Loop {
                self.frames[target].end_reached = true;
            }
        }
        Ok(())
    }

    fn op_br_table(&mut self) -> Result<(), TranslateError> {
        let count = self.reader.read_var_u32()?;
        let mut depths = Vec::with_capacity(count as usize + 1);
        for _ in 0..count {
            depths.push(self.reader.read_var_u32()?);
        }
        let default_depth = self.reader.read_var_u32()?;

        let default_target = self.frame_at_depth(default_depth)?;
        let label_type = self.label_type(default_target);
        let mut targets = Vec::with_capacity(depths.len());
        for depth in &depths {
            let target = self.frame_at_depth(*depth)?;
            if self.label_type(target) != label_type {
                return Err(ValidateError::BrTableTypeMismatch {
                    func: self.func_index,
                }
                .into());
            }
            targets.push(target);
        }

        let index = self.pop(ValType::I32)?;
        // The carried value is preserved once, before any case dispatches.
        let value = match label_type {
            Some(ty) => Some(self.peek(ty, 0)?),
            None => None,
        };

        if !self.top().is_dead {
            self.stmt(format!("switch ({index}) {{"));
            for (case, target) in targets.iter().enumerate() {
                let transfer = self.branch_stmt(*target, value.as_deref());
                self.stmt(format!("case {case}: {transfer}"));
                if self.frames[*target].kind != FrameKind::Loop {
                    self.frames[*target].end_reached = true;
                }
            }
            let transfer = self.branch_stmt(default_target, value.as_deref());
            self.stmt(format!("default: {transfer}"));
            self.stmt("}".to_string());
            if self.frames[default_target].kind != FrameKind::Loop {
                self.frames[default_target].end_reached = true;
            }
        }
        if let Some(ty) = label_type {
            self.pop(ty)?;
        }
        self.mark_dead();
        Ok(())
    }

    fn op_return(&mut self) -> Result<(), TranslateError> {
        let result = self.frames[0].signature;
        let value = match result {
            Some(ty) => Some(self.pop(ty)?),
            None => None,
        };
        if !self.top().is_dead {
            match value {
                Some(reg) => self.stmt(format!("return {reg};")),
                None => self.stmt("return;".to_string()),
            }
        }
        self.mark_dead();
        Ok(())
    }

    // ---- calls ------------------------------------------------------------

    fn pop_args(&mut self, sig: &FuncSig) -> Result<String, ValidateError> {
        let mut args = Vec::with_capacity(sig.params.len());
        for param in sig.params.iter().rev() {
            args.push(self.pop(*param)?);
        }
        args.reverse();
        Ok(args.join(", "))
    }

    fn emit_call(&mut self, callee: &str, args: &str, result: Option<ValType>) {
        match result {
            // The |0 keeps the callee's result in i32 range; floats stay
            // uncoerced so NaN boxing survives the call boundary.
            Some(ValType::I32) => {
                let r = self.push(ValType::I32);
                self.stmt(format!("{r} = {callee}({args}) | 0;"));
            }
            Some(ty) => {
                let r = self.push(ty);
                self.stmt(format!("{r} = {callee}({args});"));
            }
            None => self.stmt(format!("{callee}({args});")),
        }
    }

    fn op_call(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let sig = self.module.func_sig(index)?.clone();
        let args = self.pop_args(&sig)?;
        self.emit_call(&format!("F{index}"), &args, sig.result);
        Ok(())
    }

    fn op_call_indirect(&mut self) -> Result<(), TranslateError> {
        let type_index = self.reader.read_var_u32()?;
        let sig = self.module.types.get(type_index)?.clone();
        let reserved_offset = self.reader.pos();
        if self.reader.read_var_u1()? != 0 {
            return Err(DecodeError::Malformed {
                offset: reserved_offset,
                message: "call_indirect reserved table index must be zero",
            }
            .into());
        }
        if self.module.table.is_none() {
            return Err(ValidateError::NoTable {
                func: self.func_index,
            }
            .into());
        }
        let callee_index = self.pop(ValType::I32)?;
        let args = self.pop_args(&sig)?;
        self.indirect_type_indices.push(type_index);
        let helper = format!("call_{}", sig.sig_string());
        let all_args = if args.is_empty() {
            callee_index
        } else {
            format!("{callee_index}, {args}")
        };
        self.emit_call(&helper, &all_args, sig.result);
        Ok(())
    }

    // ---- locals and globals -----------------------------------------------

    fn local_type(&self, index: u32) -> Result<ValType, ValidateError> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or(ValidateError::LocalIndexOutOfRange {
                func: self.func_index,
                index,
            })
    }

    fn op_get_local(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let ty = self.local_type(index)?;
        let name = local_name(ty, index as usize);
        self.declare(&name, ty);
        let r = self.push(ty);
        self.stmt(format!("{r} = {name};"));
        Ok(())
    }

    fn op_set_local(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let ty = self.local_type(index)?;
        let value = self.pop(ty)?;
        let name = local_name(ty, index as usize);
        self.declare(&name, ty);
        self.stmt(format!("{name} = {value};"));
        Ok(())
    }

    fn op_tee_local(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let ty = self.local_type(index)?;
        let value = self.peek(ty, 0)?;
        let name = local_name(ty, index as usize);
        self.declare(&name, ty);
        self.stmt(format!("{name} = {value};"));
        Ok(())
    }

    fn op_get_global(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let desc = self.module.global_desc(index)?;
        let r = self.push(desc.content);
        self.stmt(format!("{r} = G{index};"));
        Ok(())
    }

    fn op_set_global(&mut self) -> Result<(), TranslateError> {
        let index = self.reader.read_var_u32()?;
        let desc = self.module.global_desc(index)?;
        if !desc.mutable {
            return Err(ValidateError::ImmutableGlobalAssigned {
                func: self.func_index,
                index,
            }
            .into());
        }
        let value = self.pop(desc.content)?;
        self.stmt(format!("G{index} = {value};"));
        Ok(())
    }

    // ---- memory -----------------------------------------------------------

    fn require_memory(&self) -> Result<(), ValidateError> {
        if self.module.memory.is_none() {
            return Err(ValidateError::NoMemory {
                func: self.func_index,
            });
        }
        Ok(())
    }

    /// Reads a memarg, checking the alignment hint against the natural
    /// alignment. Returns (hint-is-natural, offset).
    fn memarg(&mut self, natural: u32, opname: &'static str) -> Result<(bool, u32), TranslateError> {
        let align = self.reader.read_var_u32()?;
        if align > natural {
            return Err(ValidateError::AlignmentTooLarge {
                func: self.func_index,
                align,
                op: opname,
            }
            .into());
        }
        let offset = self.reader.read_var_u32()?;
        Ok((align == natural, offset))
    }

    fn bounds_check(&mut self, addr: &str, offset: u32, size: u32, opname: &str) {
        let reach = u64::from(offset) + u64::from(size);
        self.stmt(format!(
            "if (({addr} >>> 0) + {reach} > memorySize) {{ trap('{opname} OOB'); }}"
        ));
    }

    fn op_load(
        &mut self,
        result: ValType,
        natural: u32,
        size: u32,
        opname: &'static str,
        expr: impl FnOnce(&str, bool) -> String,
    ) -> Result<(), TranslateError> {
        self.require_memory()?;
        let (fast, offset) = self.memarg(natural, opname)?;
        let addr = self.pop(ValType::I32)?;
        self.bounds_check(&addr, offset, size, opname);
        let p = addr_expr(&addr, offset);
        let r = self.push(result);
        let value = expr(&p, fast);
        self.stmt(format!("{r} = {value};"));
        Ok(())
    }

    fn op_store(
        &mut self,
        operand: ValType,
        natural: u32,
        size: u32,
        opname: &'static str,
        store: impl FnOnce(&str, &str, bool) -> String,
    ) -> Result<(), TranslateError> {
        self.require_memory()?;
        let (fast, offset) = self.memarg(natural, opname)?;
        let value = self.pop(operand)?;
        let addr = self.pop(ValType::I32)?;
        self.bounds_check(&addr, offset, size, opname);
        let p = addr_expr(&addr, offset);
        let line = store(&p, &value, fast);
        self.stmt(line);
        Ok(())
    }

    // ---- numeric helpers --------------------------------------------------

    fn un_op(
        &mut self,
        operand: ValType,
        result: ValType,
        expr: impl FnOnce(&str) -> String,
    ) -> Result<(), TranslateError> {
        let a = self.pop(operand)?;
        let r = self.push(result);
        let value = expr(&a);
        self.stmt(format!("{r} = {value};"));
        Ok(())
    }

    fn bin_op(
        &mut self,
        operand: ValType,
        result: ValType,
        expr: impl FnOnce(&str, &str) -> String,
    ) -> Result<(), TranslateError> {
        let b = self.pop(operand)?;
        let a = self.pop(operand)?;
        let r = self.push(result);
        let value = expr(&a, &b);
        self.stmt(format!("{r} = {value};"));
        Ok(())
    }

    /// i32 division and remainder with their pre-operation trap guards.
    fn i32_div_op(
        &mut self,
        opname: &'static str,
        overflow_guard: bool,
        expr: impl FnOnce(&str, &str) -> String,
    ) -> Result<(), TranslateError> {
        let b = self.pop(ValType::I32)?;
        let a = self.pop(ValType::I32)?;
        self.stmt(format!("if ({b} === 0) {{ trap('{opname}'); }}"));
        if overflow_guard {
            self.stmt(format!(
                "if ({a} === -2147483648 && {b} === -1) {{ trap('{opname}'); }}"
            ));
        }
        let r = self.push(ValType::I32);
        let value = expr(&a, &b);
        self.stmt(format!("{r} = {value};"));
        Ok(())
    }

    /// i64 division and remainder guards, expressed over the Long helpers.
    fn i64_div_op(
        &mut self,
        opname: &'static str,
        overflow_guard: bool,
        helper: &'static str,
    ) -> Result<(), TranslateError> {
        let b = self.pop(ValType::I64)?;
        let a = self.pop(ValType::I64)?;
        self.stmt(format!("if ({b}.isZero()) {{ trap('{opname}'); }}"));
        if overflow_guard {
            self.stmt(format!(
                "if ({a}.eq(new Long(0, -2147483648)) && {b}.eq(new Long(-1, -1))) {{ trap('{opname}'); }}"
            ));
        }
        let r = self.push(ValType::I64);
        self.stmt(format!("{r} = {helper}({a}, {b});"));
        Ok(())
    }

    /// Float-to-integer truncation with its pre-operation range guard. The
    /// guard bounds are exclusive and reject NaN by failing both compares.
    fn trunc_op(
        &mut self,
        source: ValType,
        result: ValType,
        opname: &'static str,
        lo: &'static str,
        hi: &'static str,
        cast: impl FnOnce(&str) -> String,
    ) -> Result<(), TranslateError> {
        let a = self.pop(source)?;
        self.stmt(format!(
            "if (!({a} > {lo} && {a} < {hi})) {{ trap('{opname}'); }}"
        ));
        let r = self.push(result);
        let value = cast(&a);
        self.stmt(format!("{r} = {value};"));
        Ok(())
    }

    fn op_select(&mut self) -> Result<(), TranslateError> {
        let cond = self.pop(ValType::I32)?;
        let (t2, n2) = self.pop_any()?;
        let (t1, n1) = self.pop_any()?;
        let result = match (t1, t2) {
            (StackType::Val(a), StackType::Val(b)) => {
                if a != b && !self.top().is_polymorphic {
                    return Err(ValidateError::StackTypeMismatch {
                        func: self.func_index,
                        expected: a,
                        found: StackType::Val(b),
                    }
                    .into());
                }
                StackType::Val(a)
            }
            (StackType::Val(a), StackType::Unknown) => StackType::Val(a),
            (StackType::Unknown, StackType::Val(b)) => StackType::Val(b),
            (StackType::Unknown, StackType::Unknown) => StackType::Unknown,
        };
        match result {
            StackType::Val(ty) => {
                let r = self.push(ty);
                self.stmt(format!("{r} = {cond} ? {n1} : {n2};"));
            }
            StackType::Unknown => self.push_unknown(),
        }
        Ok(())
    }

    // ---- dispatch ---------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn step(&mut self, opcode: u8, offset: usize) -> Result<(), TranslateError> {
        use ValType::{F32, F64, I32, I64};
        match opcode {
            op::UNREACHABLE => {
                self.stmt("trap('unreachable');".to_string());
                self.mark_dead();
                Ok(())
            }
            op::NOP => Ok(()),
            op::BLOCK => self.op_block(),
            op::LOOP => self.op_loop(),
            op::IF => self.op_if(),
            op::ELSE => self.op_else(offset),
            op::END => self.op_end(),
            op::BR => {
                let depth = self.reader.read_var_u32()?;
                self.op_br(depth)
            }
            op::BR_IF => {
                let depth = self.reader.read_var_u32()?;
                self.op_br_if(depth)
            }
            op::BR_TABLE => self.op_br_table(),
            op::RETURN => self.op_return(),
            op::CALL => self.op_call(),
            op::CALL_INDIRECT => self.op_call_indirect(),

            op::DROP => {
                self.pop_any()?;
                Ok(())
            }
            op::SELECT => self.op_select(),

            op::GET_LOCAL => self.op_get_local(),
            op::SET_LOCAL => self.op_set_local(),
            op::TEE_LOCAL => self.op_tee_local(),
            op::GET_GLOBAL => self.op_get_global(),
            op::SET_GLOBAL => self.op_set_global(),

            op::I32_LOAD => self.op_load(I32, 2, 4, "i32.load", load32_expr),
            op::I64_LOAD => self.op_load(I64, 3, 8, "i64.load", |p, fast| {
                let lo = load32_expr(p, fast);
                let hi = load32_expr(&offset_expr(p, 4), fast);
                format!("new Long({lo}, {hi})")
            }),
            op::F32_LOAD => {
                self.require_memory()?;
                let (fast, offset) = self.memarg(2, "f32.load")?;
                let addr = self.pop(I32)?;
                self.bounds_check(&addr, offset, 4, "f32.load");
                let p = addr_expr(&addr, offset);
                let r = self.push(F32);
                let value = if fast {
                    format!("((({p}) & 3) == 0 ? HF32[({p}) >> 2] : f32_load_unaligned(HU8, {p}))")
                } else {
                    format!("f32_load_unaligned(HU8, {p})")
                };
                self.stmt(format!("{r} = {value};"));
                // A NaN read back from memory may carry a signalling payload;
                // re-read through the boxing helper so the flag survives.
                self.stmt(format!(
                    "if ({r} !== {r}) {{ {r} = f32_load_nan(HU8, {p}); }}"
                ));
                Ok(())
            }
            op::F64_LOAD => self.op_load(F64, 3, 8, "f64.load", |p, fast| {
                if fast {
                    format!("((({p}) & 7) == 0 ? HF64[({p}) >> 3] : f64_load_unaligned(HU8, {p}))")
                } else {
                    format!("f64_load_unaligned(HU8, {p})")
                }
            }),
            op::I32_LOAD8_S => self.op_load(I32, 0, 1, "i32.load8_s", |p, _| format!("HI8[{p}]")),
            op::I32_LOAD8_U => self.op_load(I32, 0, 1, "i32.load8_u", |p, _| format!("HU8[{p}]")),
            op::I32_LOAD16_S => self.op_load(I32, 1, 2, "i32.load16_s", load16_s_expr),
            op::I32_LOAD16_U => self.op_load(I32, 1, 2, "i32.load16_u", load16_u_expr),
            op::I64_LOAD8_S => self.op_load(I64, 0, 1, "i64.load8_s", |p, _| {
                format!("new Long(HI8[{p}], HI8[{p}] >> 31)")
            }),
            op::I64_LOAD8_U => self.op_load(I64, 0, 1, "i64.load8_u", |p, _| {
                format!("new Long(HU8[{p}], 0)")
            }),
            op::I64_LOAD16_S => self.op_load(I64, 1, 2, "i64.load16_s", |p, fast| {
                let e = load16_s_expr(p, fast);
                format!("new Long({e}, {e} >> 31)")
            }),
            op::I64_LOAD16_U => self.op_load(I64, 1, 2, "i64.load16_u", |p, fast| {
                let e = load16_u_expr(p, fast);
                format!("new Long({e}, 0)")
            }),
            op::I64_LOAD32_S => self.op_load(I64, 2, 4, "i64.load32_s", |p, fast| {
                let e = load32_expr(p, fast);
                format!("new Long({e}, {e} >> 31)")
            }),
            op::I64_LOAD32_U => self.op_load(I64, 2, 4, "i64.load32_u", |p, fast| {
                let e = load32_expr(p, fast);
                format!("new Long({e}, 0)")
            }),

            op::I32_STORE => self.op_store(I32, 2, 4, "i32.store", store32_stmt),
            op::I64_STORE => self.op_store(I64, 3, 8, "i64.store", |p, v, fast| {
                let lo = store32_stmt(p, &format!("{v}.low"), fast);
                let hi = store32_stmt(&offset_expr(p, 4), &format!("{v}.high"), fast);
                format!("{lo} {hi}")
            }),
            op::F32_STORE => self.op_store(F32, 2, 4, "f32.store", |p, v, fast| {
                // Writing clears the signalling box: the raw helper emits the
                // exact payload bits instead of the hosts canonical NaN.
                if fast {
                    format!(
                        "if ({v} !== {v}) {{ f32_store_nan(HU8, {p}, {v}); }} else if ((({p}) & 3) == 0) {{ HF32[({p}) >> 2] = {v}; }} else {{ f32_store_unaligned(HU8, {p}, {v}); }}"
                    )
                } else {
                    format!(
                        "if ({v} !== {v}) {{ f32_store_nan(HU8, {p}, {v}); }} else {{ f32_store_unaligned(HU8, {p}, {v}); }}"
                    )
                }
            }),
            op::F64_STORE => self.op_store(F64, 3, 8, "f64.store", |p, v, fast| {
                if fast {
                    format!(
                        "if ((({p}) & 7) == 0) {{ HF64[({p}) >> 3] = {v}; }} else {{ f64_store_unaligned(HU8, {p}, {v}); }}"
                    )
                } else {
                    format!("f64_store_unaligned(HU8, {p}, {v});")
                }
            }),
            op::I32_STORE8 => {
                self.op_store(I32, 0, 1, "i32.store8", |p, v, _| format!("HU8[{p}] = {v};"))
            }
            op::I32_STORE16 => self.op_store(I32, 1, 2, "i32.store16", store16_stmt),
            op::I64_STORE8 => self.op_store(I64, 0, 1, "i64.store8", |p, v, _| {
                format!("HU8[{p}] = {v}.low;")
            }),
            op::I64_STORE16 => self.op_store(I64, 1, 2, "i64.store16", |p, v, fast| {
                store16_stmt(p, &format!("{v}.low"), fast)
            }),
            op::I64_STORE32 => self.op_store(I64, 2, 4, "i64.store32", |p, v, fast| {
                store32_stmt(p, &format!("{v}.low"), fast)
            }),

            op::CURRENT_MEMORY => {
                self.require_memory()?;
                let reserved_offset = self.reader.pos();
                if self.reader.read_var_u1()? != 0 {
                    return Err(DecodeError::Malformed {
                        offset: reserved_offset,
                        message: "current_memory reserved field must be zero",
                    }
                    .into());
                }
                let r = self.push(I32);
                self.stmt(format!("{r} = (memorySize / {PAGE_SIZE}) | 0;"));
                Ok(())
            }
            op::GROW_MEMORY => {
                self.require_memory()?;
                let reserved_offset = self.reader.pos();
                if self.reader.read_var_u1()? != 0 {
                    return Err(DecodeError::Malformed {
                        offset: reserved_offset,
                        message: "grow_memory reserved field must be zero",
                    }
                    .into());
                }
                let pages = self.pop(I32)?;
                let r = self.push(I32);
                self.stmt(format!("{r} = grow_memory({pages}) | 0;"));
                Ok(())
            }

            op::I32_CONST => {
                let v = self.reader.read_var_s32()?;
                let r = self.push(I32);
                self.stmt(format!("{r} = {v};"));
                Ok(())
            }
            op::I64_CONST => {
                let v = self.reader.read_var_s64()?;
                let low = (v as u64 & 0xffff_ffff) as u32 as i32;
                let high = ((v as u64) >> 32) as u32 as i32;
                let r = self.push(I64);
                self.stmt(format!("{r} = new Long({low}, {high});"));
                Ok(())
            }
            op::F32_CONST => {
                let bits = self.reader.read_f32_bits()?;
                let r = self.push(F32);
                let lit = f32_literal(bits);
                self.stmt(format!("{r} = {lit};"));
                Ok(())
            }
            op::F64_CONST => {
                let bits = self.reader.read_f64_bits()?;
                let r = self.push(F64);
                let lit = f64_literal(bits);
                self.stmt(format!("{r} = {lit};"));
                Ok(())
            }

            op::I32_EQZ => self.un_op(I32, I32, |a| format!("({a} === 0) | 0")),
            op::I32_EQ => self.bin_op(I32, I32, |a, b| format!("({a} === {b}) | 0")),
            op::I32_NE => self.bin_op(I32, I32, |a, b| format!("({a} !== {b}) | 0")),
            op::I32_LT_S => self.bin_op(I32, I32, |a, b| format!("({a} < {b}) | 0")),
            op::I32_LT_U => {
                self.bin_op(I32, I32, |a, b| format!("(({a} >>> 0) < ({b} >>> 0)) | 0"))
            }
            op::I32_GT_S => self.bin_op(I32, I32, |a, b| format!("({a} > {b}) | 0")),
            op::I32_GT_U => {
                self.bin_op(I32, I32, |a, b| format!("(({a} >>> 0) > ({b} >>> 0)) | 0"))
            }
            op::I32_LE_S => self.bin_op(I32, I32, |a, b| format!("({a} <= {b}) | 0")),
            op::I32_LE_U => {
                self.bin_op(I32, I32, |a, b| format!("(({a} >>> 0) <= ({b} >>> 0)) | 0"))
            }
            op::I32_GE_S => self.bin_op(I32, I32, |a, b| format!("({a} >= {b}) | 0")),
            op::I32_GE_U => {
                self.bin_op(I32, I32, |a, b| format!("(({a} >>> 0) >= ({b} >>> 0)) | 0"))
            }

            op::I64_EQZ => self.un_op(I64, I32, |a| format!("{a}.isZero() | 0")),
            op::I64_EQ => self.bin_op(I64, I32, |a, b| format!("i64_eq({a}, {b})")),
            op::I64_NE => self.bin_op(I64, I32, |a, b| format!("i64_ne({a}, {b})")),
            op::I64_LT_S => self.bin_op(I64, I32, |a, b| format!("i64_lt_s({a}, {b})")),
            op::I64_LT_U => self.bin_op(I64, I32, |a, b| format!("i64_lt_u({a}, {b})")),
            op::I64_GT_S => self.bin_op(I64, I32, |a, b| format!("i64_gt_s({a}, {b})")),
            op::I64_GT_U => self.bin_op(I64, I32, |a, b| format!("i64_gt_u({a}, {b})")),
            op::I64_LE_S => self.bin_op(I64, I32, |a, b| format!("i64_le_s({a}, {b})")),
            op::I64_LE_U => self.bin_op(I64, I32, |a, b| format!("i64_le_u({a}, {b})")),
            op::I64_GE_S => self.bin_op(I64, I32, |a, b| format!("i64_ge_s({a}, {b})")),
            op::I64_GE_U => self.bin_op(I64, I32, |a, b| format!("i64_ge_u({a}, {b})")),

            op::F32_EQ | op::F64_EQ => {
                let ty = if opcode == op::F32_EQ { F32 } else { F64 };
                self.bin_op(ty, I32, |a, b| format!("({a} === {b}) | 0"))
            }
            op::F32_NE | op::F64_NE => {
                let ty = if opcode == op::F32_NE { F32 } else { F64 };
                self.bin_op(ty, I32, |a, b| format!("({a} !== {b}) | 0"))
            }
            op::F32_LT | op::F64_LT => {
                let ty = if opcode == op::F32_LT { F32 } else { F64 };
                self.bin_op(ty, I32, |a, b| format!("({a} < {b}) | 0"))
            }
            op::F32_GT | op::F64_GT => {
                let ty = if opcode == op::F32_GT { F32 } else { F64 };
                self.bin_op(ty, I32, |a, b| format!("({a} > {b}) | 0"))
            }
            op::F32_LE | op::F64_LE => {
                let ty = if opcode == op::F32_LE { F32 } else { F64 };
                self.bin_op(ty, I32, |a, b| format!("({a} <= {b}) | 0"))
            }
            op::F32_GE | op::F64_GE => {
                let ty = if opcode == op::F32_GE { F32 } else { F64 };
                self.bin_op(ty, I32, |a, b| format!("({a} >= {b}) | 0"))
            }

            op::I32_CLZ => self.un_op(I32, I32, |a| format!("i32_clz({a})")),
            op::I32_CTZ => self.un_op(I32, I32, |a| format!("i32_ctz({a})")),
            op::I32_POPCNT => self.un_op(I32, I32, |a| format!("i32_popcnt({a})")),
            op::I32_ADD => self.bin_op(I32, I32, |a, b| format!("({a} + {b}) | 0")),
            op::I32_SUB => self.bin_op(I32, I32, |a, b| format!("({a} - {b}) | 0")),
            op::I32_MUL => self.bin_op(I32, I32, |a, b| format!("i32_mul({a}, {b})")),
            op::I32_DIV_S => self.i32_div_op("i32_div_s", true, |a, b| format!("({a} / {b}) | 0")),
            op::I32_DIV_U => self.i32_div_op("i32_div_u", false, |a, b| {
                format!("(({a} >>> 0) / ({b} >>> 0)) | 0")
            }),
            op::I32_REM_S => self.i32_div_op("i32_rem_s", false, |a, b| format!("({a} % {b}) | 0")),
            op::I32_REM_U => self.i32_div_op("i32_rem_u", false, |a, b| {
                format!("(({a} >>> 0) % ({b} >>> 0)) | 0")
            }),
            op::I32_AND => self.bin_op(I32, I32, |a, b| format!("{a} & {b}")),
            op::I32_OR => self.bin_op(I32, I32, |a, b| format!("{a} | {b}")),
            op::I32_XOR => self.bin_op(I32, I32, |a, b| format!("{a} ^ {b}")),
            op::I32_SHL => self.bin_op(I32, I32, |a, b| format!("{a} << {b}")),
            op::I32_SHR_S => self.bin_op(I32, I32, |a, b| format!("{a} >> {b}")),
            op::I32_SHR_U => self.bin_op(I32, I32, |a, b| format!("({a} >>> {b}) | 0")),
            op::I32_ROTL => self.bin_op(I32, I32, |a, b| format!("i32_rotl({a}, {b})")),
            op::I32_ROTR => self.bin_op(I32, I32, |a, b| format!("i32_rotr({a}, {b})")),

            op::I64_CLZ => self.un_op(I64, I64, |a| format!("i64_clz({a})")),
            op::I64_CTZ => self.un_op(I64, I64, |a| format!("i64_ctz({a})")),
            op::I64_POPCNT => self.un_op(I64, I64, |a| format!("i64_popcnt({a})")),
            op::I64_ADD => self.bin_op(I64, I64, |a, b| format!("i64_add({a}, {b})")),
            op::I64_SUB => self.bin_op(I64, I64, |a, b| format!("i64_sub({a}, {b})")),
            op::I64_MUL => self.bin_op(I64, I64, |a, b| format!("i64_mul({a}, {b})")),
            op::I64_DIV_S => self.i64_div_op("i64_div_s", true, "i64_div_s"),
            op::I64_DIV_U => self.i64_div_op("i64_div_u", false, "i64_div_u"),
            op::I64_REM_S => self.i64_div_op("i64_rem_s", false, "i64_rem_s"),
            op::I64_REM_U => self.i64_div_op("i64_rem_u", false, "i64_rem_u"),
            op::I64_AND => self.bin_op(I64, I64, |a, b| format!("i64_and({a}, {b})")),
            op::I64_OR => self.bin_op(I64, I64, |a, b| format!("i64_or({a}, {b})")),
            op::I64_XOR => self.bin_op(I64, I64, |a, b| format!("i64_xor({a}, {b})")),
            op::I64_SHL => self.bin_op(I64, I64, |a, b| format!("i64_shl({a}, {b})")),
            op::I64_SHR_S => self.bin_op(I64, I64, |a, b| format!("i64_shr_s({a}, {b})")),
            op::I64_SHR_U => self.bin_op(I64, I64, |a, b| format!("i64_shr_u({a}, {b})")),
            op::I64_ROTL => self.bin_op(I64, I64, |a, b| format!("i64_rotl({a}, {b})")),
            op::I64_ROTR => self.bin_op(I64, I64, |a, b| format!("i64_rotr({a}, {b})")),

            op::F32_ABS => self.un_op(F32, F32, |a| format!("f32_abs({a})")),
            op::F32_NEG => self.un_op(F32, F32, |a| format!("-{a}")),
            op::F32_CEIL => self.un_op(F32, F32, |a| format!("f32_ceil({a})")),
            op::F32_FLOOR => self.un_op(F32, F32, |a| format!("f32_floor({a})")),
            op::F32_TRUNC => self.un_op(F32, F32, |a| format!("f32_trunc({a})")),
            op::F32_NEAREST => self.un_op(F32, F32, |a| format!("f32_nearest({a})")),
            op::F32_SQRT => self.un_op(F32, F32, |a| format!("f32_sqrt({a})")),
            op::F32_ADD => self.bin_op(F32, F32, |a, b| format!("ToF32({a} + {b})")),
            op::F32_SUB => self.bin_op(F32, F32, |a, b| format!("ToF32({a} - {b})")),
            op::F32_MUL => self.bin_op(F32, F32, |a, b| format!("ToF32({a} * {b})")),
            op::F32_DIV => self.bin_op(F32, F32, |a, b| format!("ToF32({a} / {b})")),
            op::F32_MIN => self.bin_op(F32, F32, |a, b| format!("f32_min({a}, {b})")),
            op::F32_MAX => self.bin_op(F32, F32, |a, b| format!("f32_max({a}, {b})")),
            op::F32_COPYSIGN => self.bin_op(F32, F32, |a, b| format!("f32_copysign({a}, {b})")),

            op::F64_ABS => self.un_op(F64, F64, |a| format!("f64_abs({a})")),
            op::F64_NEG => self.un_op(F64, F64, |a| format!("-{a}")),
            op::F64_CEIL => self.un_op(F64, F64, |a| format!("f64_ceil({a})")),
            op::F64_FLOOR => self.un_op(F64, F64, |a| format!("f64_floor({a})")),
            op::F64_TRUNC => self.un_op(F64, F64, |a| format!("f64_trunc({a})")),
            op::F64_NEAREST => self.un_op(F64, F64, |a| format!("f64_nearest({a})")),
            op::F64_SQRT => self.un_op(F64, F64, |a| format!("f64_sqrt({a})")),
            op::F64_ADD => self.bin_op(F64, F64, |a, b| format!("{a} + {b}")),
            op::F64_SUB => self.bin_op(F64, F64, |a, b| format!("{a} - {b}")),
            op::F64_MUL => self.bin_op(F64, F64, |a, b| format!("{a} * {b}")),
            op::F64_DIV => self.bin_op(F64, F64, |a, b| format!("{a} / {b}")),
            op::F64_MIN => self.bin_op(F64, F64, |a, b| format!("f64_min({a}, {b})")),
            op::F64_MAX => self.bin_op(F64, F64, |a, b| format!("f64_max({a}, {b})")),
            op::F64_COPYSIGN => self.bin_op(F64, F64, |a, b| format!("f64_copysign({a}, {b})")),

            op::I32_WRAP_I64 => self.un_op(I64, I32, |a| format!("{a}.low")),
            op::I32_TRUNC_S_F32 => self.trunc_op(F32, I32, "i32_trunc_s_f32", "-2147483649", "2147483648", |a| {
                format!("{a} | 0")
            }),
            op::I32_TRUNC_U_F32 => self.trunc_op(F32, I32, "i32_trunc_u_f32", "-1", "4294967296", |a| {
                format!("({a} >>> 0) | 0")
            }),
            op::I32_TRUNC_S_F64 => self.trunc_op(F64, I32, "i32_trunc_s_f64", "-2147483649", "2147483648", |a| {
                format!("{a} | 0")
            }),
            op::I32_TRUNC_U_F64 => self.trunc_op(F64, I32, "i32_trunc_u_f64", "-1", "4294967296", |a| {
                format!("({a} >>> 0) | 0")
            }),
            op::I64_EXTEND_S_I32 => self.un_op(I32, I64, |a| format!("new Long({a}, {a} >> 31)")),
            op::I64_EXTEND_U_I32 => self.un_op(I32, I64, |a| format!("new Long({a}, 0)")),
            op::I64_TRUNC_S_F32 => self.trunc_op(
                F32,
                I64,
                "i64_trunc_s_f32",
                "-9223372036854777856",
                "9223372036854775808",
                |a| format!("i64_trunc_s_f64({a})"),
            ),
            op::I64_TRUNC_U_F32 => self.trunc_op(
                F32,
                I64,
                "i64_trunc_u_f32",
                "-1",
                "18446744073709551616",
                |a| format!("i64_trunc_u_f64({a})"),
            ),
            op::I64_TRUNC_S_F64 => self.trunc_op(
                F64,
                I64,
                "i64_trunc_s_f64",
                "-9223372036854777856",
                "9223372036854775808",
                |a| format!("i64_trunc_s_f64({a})"),
            ),
            op::I64_TRUNC_U_F64 => self.trunc_op(
                F64,
                I64,
                "i64_trunc_u_f64",
                "-1",
                "18446744073709551616",
                |a| format!("i64_trunc_u_f64({a})"),
            ),
            op::F32_CONVERT_S_I32 => self.un_op(I32, F32, |a| format!("ToF32({a})")),
            op::F32_CONVERT_U_I32 => self.un_op(I32, F32, |a| format!("ToF32({a} >>> 0)")),
            op::F32_CONVERT_S_I64 => self.un_op(I64, F32, |a| format!("i64_to_f32_s({a})")),
            op::F32_CONVERT_U_I64 => self.un_op(I64, F32, |a| format!("i64_to_f32_u({a})")),
            op::F32_DEMOTE_F64 => self.un_op(F64, F32, |a| format!("ToF32({a})")),
            op::F64_CONVERT_S_I32 => self.un_op(I32, F64, |a| a.to_string()),
            op::F64_CONVERT_U_I32 => self.un_op(I32, F64, |a| format!("{a} >>> 0")),
            op::F64_CONVERT_S_I64 => self.un_op(I64, F64, |a| format!("i64_to_f64_s({a})")),
            op::F64_CONVERT_U_I64 => self.un_op(I64, F64, |a| format!("i64_to_f64_u({a})")),
            op::F64_PROMOTE_F32 => self.un_op(F32, F64, |a| a.to_string()),
            op::I32_REINTERPRET_F32 => self.un_op(F32, I32, |a| format!("i32_reinterpret_f32({a})")),
            op::I64_REINTERPRET_F64 => self.un_op(F64, I64, |a| format!("i64_reinterpret_f64({a})")),
            op::F32_REINTERPRET_I32 => self.un_op(I32, F32, |a| format!("f32_reinterpret_i32({a})")),
            op::F64_REINTERPRET_I64 => self.un_op(I64, F64, |a| format!("f64_reinterpret_i64({a})")),

            _ => Err(DecodeError::UnsupportedOpcode {
                func: self.func_index,
                offset,
                opcode,
            }
            .into()),
        }
    }
}

// ---- shared emission fragments --------------------------------------------

fn local_name(ty: ValType, index: usize) -> String {
    format!("l{}{index}", ty.letter())
}

fn stack_name(ty: ValType, height: usize) -> String {
    format!("s{}{height}", ty.letter())
}

fn addr_expr(addr: &str, offset: u32) -> String {
    if offset == 0 {
        addr.to_string()
    } else {
        format!("{addr} + {offset}")
    }
}

fn offset_expr(p: &str, extra: u32) -> String {
    format!("{p} + {extra}")
}

fn load32_expr(p: &str, fast: bool) -> String {
    if fast {
        format!("((({p}) & 3) == 0 ? HI32[({p}) >> 2] : i32_load_unaligned(HU8, {p}))")
    } else {
        format!("i32_load_unaligned(HU8, {p})")
    }
}

fn load16_s_expr(p: &str, fast: bool) -> String {
    if fast {
        format!("((({p}) & 1) == 0 ? HI16[({p}) >> 1] : i32_load16_s_unaligned(HU8, {p}))")
    } else {
        format!("i32_load16_s_unaligned(HU8, {p})")
    }
}

fn load16_u_expr(p: &str, fast: bool) -> String {
    if fast {
        format!("((({p}) & 1) == 0 ? HU16[({p}) >> 1] : i32_load16_u_unaligned(HU8, {p}))")
    } else {
        format!("i32_load16_u_unaligned(HU8, {p})")
    }
}

fn store32_stmt(p: &str, v: &str, fast: bool) -> String {
    if fast {
        format!(
            "if ((({p}) & 3) == 0) {{ HI32[({p}) >> 2] = {v}; }} else {{ i32_store_unaligned(HU8, {p}, {v}); }}"
        )
    } else {
        format!("i32_store_unaligned(HU8, {p}, {v});")
    }
}

fn store16_stmt(p: &str, v: &str, fast: bool) -> String {
    if fast {
        format!(
            "if ((({p}) & 1) == 0) {{ HI16[({p}) >> 1] = {v}; }} else {{ i32_store16_unaligned(HU8, {p}, {v}); }}"
        )
    } else {
        format!("i32_store16_unaligned(HU8, {p}, {v});")
    }
}

/// Renders an f32 constant from raw bits. Finite values print as their
/// exact double promotion; NaNs go through the bit-cast helper so payloads
/// survive.
pub(crate) fn f32_literal(bits: u32) -> String {
    let value = f32::from_bits(bits);
    if value.is_nan() {
        format!("f32_reinterpret_i32({})", bits as i32)
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            "-Infinity".to_string()
        } else {
            "Infinity".to_string()
        }
    } else {
        format!("{:?}", f64::from(value))
    }
}

pub(crate) fn f64_literal(bits: u64) -> String {
    let value = f64::from_bits(bits);
    if value.is_nan() {
        let low = (bits & 0xffff_ffff) as u32 as i32;
        let high = (bits >> 32) as u32 as i32;
        format!("f64_reinterpret_i64(new Long({low}, {high}))")
    } else if value.is_infinite() {
        if value.is_sign_negative() {
            "-Infinity".to_string()
        } else {
            "Infinity".to_string()
        }
    } else {
        format!("{value:?}")
    }
}
