//! Execution context and the driver loop interpreting events.
//!
//! Handlers never transfer control themselves. `step` dispatches one
//! instruction and returns the event it raised; `handle_event` performs the
//! branch, call or trap. Calls push an explicit [`Frame`] instead of
//! recursing, so wasm call depth is bounded by [`Config::max_frames`] rather
//! than the native stack.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::binary::Cursor;
use crate::config::Config;
use crate::error::{CodeError, InvokeError, Trap, TrapKind};
use crate::model::{BlockType, FuncAddr, ValType, Value};
use crate::runtime::instance::{FuncKind, Instance};
use crate::runtime::memory::MemoryInstance;
use crate::runtime::table::TableInstance;
use crate::validate::{FuncInfo, ValidatedModule};
use crate::vm::event::Event;
use crate::vm::frames::{Frame, Label, LabelKind};
use crate::vm::instructions::dispatch;
use crate::vm::mode::Cx;
use crate::vm::stack::{Cell, Stack};

type Observer<'i> = Box<dyn FnMut(FuncAddr, usize, usize) + 'i>;

/// State of one activation chain over an instance.
pub struct ExecContext<'i> {
    pub(crate) instance: &'i mut Instance,
    pub(crate) module: Arc<ValidatedModule>,
    pub(crate) stack: Stack<Cell>,
    pub(crate) labels: Vec<Label>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) pc: usize,
    pub(crate) event: Option<Event>,
    /// Name of the instruction being executed, for trap messages.
    pub(crate) opcode: &'static str,
    config: Config,
    interrupt: Option<Arc<AtomicBool>>,
    observer: Option<Observer<'i>>,
}

fn invalid(err: impl fmt::Display) -> Trap {
    Trap::new(TrapKind::InvalidCode, err.to_string())
}

impl<'i> ExecContext<'i> {
    pub fn new(instance: &'i mut Instance) -> Self {
        let module = Arc::clone(instance.module());
        let config = instance.config().clone();
        Self {
            instance,
            module,
            stack: Stack::new(),
            labels: Vec::new(),
            frames: Vec::new(),
            pc: 0,
            event: None,
            opcode: "",
            config,
            interrupt: None,
            observer: None,
        }
    }

    /// Trap with [`TrapKind::Interrupted`] at the next branch or call once `flag` is set.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    /// Observe `(function, pc, operand cells above the frame)` before every instruction.
    pub fn set_observer(&mut self, f: impl FnMut(FuncAddr, usize, usize) + 'i) {
        self.observer = Some(Box::new(f));
    }

    pub fn stack_height(&self) -> usize {
        self.stack.len()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Call `func` with `args` and run it to completion.
    ///
    /// On a trap the frame, label and operand stacks are restored to their
    /// state before the call.
    pub fn invoke(&mut self, func: FuncAddr, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
        let ty = self
            .instance
            .func(func)
            .map(|f| f.ty.clone())
            .ok_or(InvokeError::UnknownFunction(func))?;
        if args.len() != ty.params.len() {
            return Err(InvokeError::ArgumentCount {
                func,
                expected: ty.params.len(),
                found: args.len(),
            });
        }
        for (index, (arg, &expected)) in args.iter().zip(&ty.params).enumerate() {
            if arg.ty() != expected {
                return Err(InvokeError::ArgumentType { index, expected, found: arg.ty() });
            }
            if arg.uses_reserved_ref() {
                return Err(InvokeError::ReservedReference { index });
            }
        }

        let (frames, labels, height, pc) =
            (self.frames.len(), self.labels.len(), self.stack.len(), self.pc);
        for &arg in args {
            self.stack.push_value(arg);
        }
        let outcome = self.call(func).and_then(|()| self.run(frames));
        self.pc = pc;
        if let Err(trap) = outcome {
            debug!(func, %trap, "invocation trapped");
            self.frames.truncate(frames);
            self.labels.truncate(labels);
            self.stack.truncate(height);
            return Err(trap.into());
        }

        let mut results = Vec::with_capacity(ty.results.len());
        for &t in ty.results.iter().rev() {
            let v = self
                .stack
                .pop_value(t)
                .ok_or_else(|| invalid(CodeError::StackUnderflow))?;
            results.push(v);
        }
        results.reverse();
        Ok(results)
    }

    /// Drive until the frame stack is back at `base` frames.
    fn run(&mut self, base: usize) -> Result<(), Trap> {
        let module = Arc::clone(&self.module);
        while self.frames.len() > base {
            if let Some(event) = self.step_with(&module) {
                self.handle_event(event)?;
            }
        }
        Ok(())
    }

    /// Execute the instruction at the current pc. `None` means it fell through.
    pub fn step(&mut self) -> Option<Event> {
        let module = Arc::clone(&self.module);
        self.step_with(&module)
    }

    fn step_with(&mut self, module: &ValidatedModule) -> Option<Event> {
        let Some(frame) = self.frames.last() else {
            return Some(Event::Trap(invalid(CodeError::NoActiveFrame)));
        };
        let (func, depth) = (frame.func, self.frames.len());
        let Some(code) = module.code(frame.def_index) else {
            return Some(Event::Trap(invalid(CodeError::UnknownIndex {
                space: "function",
                index: func,
            })));
        };
        if let Some(observe) = self.observer.as_mut() {
            observe(func, self.pc, self.stack.len() - frame.height);
        }

        let mut cur = Cursor::at(code, self.pc);
        self.event = None;
        if let Err((name, err)) = dispatch(&mut Cx::Execute(&mut *self), &mut cur) {
            self.event = Some(Event::Trap(Trap::new(TrapKind::InvalidCode, format!("{name}: {err}"))));
        }
        let event = self.event.take();
        // Branches relocate pc in the driver; leaving a frame reloads the caller's pc.
        if !matches!(event, Some(Event::Branch { .. })) && self.frames.len() == depth {
            self.pc = cur.offset();
        }
        event
    }

    /// Interpret one event the way the outer driver does.
    pub fn handle_event(&mut self, event: Event) -> Result<(), Trap> {
        match event {
            Event::Branch { level, goto_else } => {
                self.check_interrupt()?;
                trace!(level, goto_else, "branch");
                self.branch(level, goto_else).map_err(invalid)
            }
            Event::Call { callee } => {
                self.check_interrupt()?;
                trace!(callee, "call");
                self.call(callee)
            }
            Event::Trap(trap) => {
                trace!(%trap, "trap");
                Err(trap)
            }
        }
    }

    fn check_interrupt(&self) -> Result<(), Trap> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                Err(Trap::new(TrapKind::Interrupted, "execution interrupted"))
            }
            _ => Ok(()),
        }
    }

    fn branch(&mut self, level: u32, goto_else: bool) -> Result<(), CodeError> {
        let open = self.labels_in_frame()?;
        if level == open {
            return self.frame_exit();
        }
        let target = self
            .labels
            .len()
            .checked_sub(level as usize + 1)
            .filter(|_| level < open)
            .ok_or(CodeError::UnknownLabel(level))?;
        let label = self.labels[target];
        if goto_else {
            self.pc = label.else_resume;
            return Ok(());
        }
        self.stack.rewind(label.height, label.arity);
        // A loop label survives a branch to it.
        let keep = if label.kind == LabelKind::Loop { target + 1 } else { target };
        self.labels.truncate(keep);
        self.pc = label.continuation;
        Ok(())
    }

    fn call(&mut self, callee: FuncAddr) -> Result<(), Trap> {
        let func = self
            .instance
            .func(callee)
            .ok_or_else(|| invalid(CodeError::UnknownIndex { space: "function", index: callee }))?;
        let def_index = match &func.kind {
            FuncKind::Wasm { def_index } => *def_index,
            FuncKind::Host(host) => {
                let (host, ty) = (Arc::clone(host), func.ty.clone());
                let mut args = Vec::with_capacity(ty.params.len());
                for &t in ty.params.iter().rev() {
                    args.push(self.stack.pop_value(t).ok_or_else(|| invalid(CodeError::StackUnderflow))?);
                }
                args.reverse();
                let results = host(&args)?;
                let matches = results.len() == ty.results.len()
                    && results.iter().zip(&ty.results).all(|(v, &t)| v.ty() == t && !v.uses_reserved_ref());
                if !matches {
                    return Err(Trap::new(
                        TrapKind::Host,
                        format!("function {callee} returned values not matching {:?}", ty.results),
                    ));
                }
                for v in results {
                    self.stack.push_value(v);
                }
                return Ok(());
            }
        };

        if self.frames.len() >= self.config.max_frames {
            return Err(Trap::new(
                TrapKind::CallStackExhausted,
                format!("more than {} nested calls", self.config.max_frames),
            ));
        }
        let info = self
            .module
            .func(def_index)
            .ok_or_else(|| invalid(CodeError::UnknownIndex { space: "function", index: callee }))?;
        let base = self
            .stack
            .len()
            .checked_sub(info.param_cells)
            .ok_or_else(|| invalid(CodeError::StackUnderflow))?;
        let mut locals = Vec::with_capacity(info.param_cells + info.local_init.len());
        locals.extend_from_slice(&self.stack.as_slice()[base..]);
        locals.extend_from_slice(&info.local_init);
        self.stack.truncate(base);
        if base + locals.len() > self.config.max_stack_cells {
            return Err(Trap::new(
                TrapKind::CallStackExhausted,
                format!("operand stack exceeds {} cells", self.config.max_stack_cells),
            ));
        }
        self.frames.push(Frame {
            func: callee,
            def_index,
            locals,
            return_pc: self.pc,
            label_base: self.labels.len(),
            height: base,
            result_cells: info.result_cells,
        });
        self.pc = 0;
        Ok(())
    }

    /// Pop the current frame, leaving its results on the caller's stack.
    pub(crate) fn frame_exit(&mut self) -> Result<(), CodeError> {
        let frame = self.frames.pop().ok_or(CodeError::NoActiveFrame)?;
        self.labels.truncate(frame.label_base);
        self.stack.rewind(frame.height, frame.result_cells);
        self.pc = frame.return_pc;
        Ok(())
    }

    /// Raise a trap from a handler; `return e.trap(..)` ends the instruction.
    pub(crate) fn trap(&mut self, kind: TrapKind, detail: impl fmt::Display) -> Result<(), CodeError> {
        let detail = detail.to_string();
        let message = if detail.is_empty() {
            self.opcode.to_string()
        } else {
            format!("{}: {detail}", self.opcode)
        };
        self.event = Some(Event::Trap(Trap::new(kind, message)));
        Ok(())
    }

    pub(crate) fn raise(&mut self, event: Event) -> Result<(), CodeError> {
        self.event = Some(event);
        Ok(())
    }

    pub(crate) fn frame(&self) -> Result<&Frame, CodeError> {
        self.frames.last().ok_or(CodeError::NoActiveFrame)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, CodeError> {
        self.frames.last_mut().ok_or(CodeError::NoActiveFrame)
    }

    pub(crate) fn info(&self) -> Result<&FuncInfo, CodeError> {
        let frame = self.frame()?;
        self.module.func(frame.def_index).ok_or(CodeError::UnknownIndex {
            space: "function",
            index: frame.func,
        })
    }

    pub(crate) fn labels_in_frame(&self) -> Result<u32, CodeError> {
        let base = self.frame()?.label_base;
        Ok((self.labels.len() - base) as u32)
    }

    /// Concrete type validation recorded for the instruction at `site`.
    pub(crate) fn annotation(&self, site: usize) -> Result<ValType, CodeError> {
        self.info()?
            .annotations
            .get(site)
            .ok_or(CodeError::MissingAnnotation(site))
    }

    /// Open a label for the construct whose opcode is at `start`; `body` is
    /// the offset just past its block type.
    pub(crate) fn push_label(
        &mut self,
        kind: LabelKind,
        start: usize,
        bt: BlockType,
        body: usize,
    ) -> Result<(), CodeError> {
        let (params, results) = self
            .module
            .module()
            .block_cells(bt)
            .ok_or(CodeError::BadImmediate("block type"))?;
        let slot = *self.info()?.jumps.get(start).ok_or(CodeError::MissingJump(start))?;
        let height = self
            .stack
            .len()
            .checked_sub(params)
            .ok_or(CodeError::StackUnderflow)?;
        let after_end = slot.end_pc as usize + 1;
        let label = match kind {
            LabelKind::Loop => Label { kind, height, arity: params, continuation: body, else_resume: body },
            LabelKind::Block => Label { kind, height, arity: results, continuation: after_end, else_resume: after_end },
            LabelKind::If => Label {
                kind,
                height,
                arity: results,
                continuation: after_end,
                else_resume: slot.else_pc.map_or(slot.end_pc as usize, |pc| pc as usize + 1),
            },
        };
        self.labels.push(label);
        Ok(())
    }

    /// Cell offset and width of local `idx` in the current frame.
    fn local_slot(&self, idx: u32) -> Result<(usize, usize), CodeError> {
        let info = self.info()?;
        let ty = info.locals.get(idx as usize);
        let off = info.local_offsets.get(idx as usize);
        match (ty, off) {
            (Some(ty), Some(&off)) => Ok((off, ty.cells())),
            _ => Err(CodeError::UnknownIndex { space: "local", index: idx }),
        }
    }

    pub(crate) fn local_get(&mut self, idx: u32) -> Result<(), CodeError> {
        let (off, n) = self.local_slot(idx)?;
        let frame = self.frames.last().ok_or(CodeError::NoActiveFrame)?;
        let cells = frame
            .locals
            .get(off..off + n)
            .ok_or(CodeError::UnknownIndex { space: "local", index: idx })?;
        self.stack.extend_from_slice(cells);
        Ok(())
    }

    /// Copy the top value into local `idx`, popping it unless `keep`.
    pub(crate) fn local_set(&mut self, idx: u32, keep: bool) -> Result<(), CodeError> {
        let (off, n) = self.local_slot(idx)?;
        let top = self.stack.len().checked_sub(n).ok_or(CodeError::StackUnderflow)?;
        let mut value = [0; 2];
        value[..n].copy_from_slice(&self.stack.as_slice()[top..]);
        let frame = self.frame_mut()?;
        frame
            .locals
            .get_mut(off..off + n)
            .ok_or(CodeError::UnknownIndex { space: "local", index: idx })?
            .copy_from_slice(&value[..n]);
        if !keep {
            self.stack.truncate(top);
        }
        Ok(())
    }

    pub(crate) fn memory(&mut self) -> Result<&mut MemoryInstance, CodeError> {
        self.instance
            .memories
            .first_mut()
            .ok_or(CodeError::UnknownIndex { space: "memory", index: 0 })
    }

    pub(crate) fn table(&mut self, idx: u32) -> Result<&mut TableInstance, CodeError> {
        self.instance
            .tables
            .get_mut(idx as usize)
            .ok_or(CodeError::UnknownIndex { space: "table", index: idx })
    }
}
