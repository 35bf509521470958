use bytecode::{Instruction, Literal, Op, Rep};
use log::{debug, trace};

use crate::error::{RuntimeError, VmResult};
use crate::object::{ObjId, Payload};
use crate::runtime::Runtime;

/// The method a frame is executing, for `SUPER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMethod {
    pub owner: ObjId,
    pub name: String,
}

/// What an evaluation runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub self_obj: ObjId,
    /// Where `DEF`, `UNDEF` and class variables act.
    pub target_class: ObjId,
    pub method: Option<ActiveMethod>,
}

impl Context {
    pub fn top_level(main: ObjId, object: ObjId) -> Self {
        Self {
            self_obj: main,
            target_class: object,
            method: None,
        }
    }

    pub fn method(receiver: ObjId, owner: ObjId, name: &str) -> Self {
        Self {
            self_obj: receiver,
            target_class: owner,
            method: Some(ActiveMethod {
                owner,
                name: name.to_string(),
            }),
        }
    }

    /// A class or module body: `self` and the target class are the class.
    pub fn class_body(class: ObjId) -> Self {
        Self {
            self_obj: class,
            target_class: class,
            method: None,
        }
    }
}

struct Frame<'a> {
    rep: &'a Rep,
    regs: Vec<ObjId>,
    ctx: Context,
    nil: ObjId,
}

impl<'a> Frame<'a> {
    /// Registers never written read as `nil`.
    #[inline]
    fn get(&self, idx: u16) -> ObjId {
        self.regs.get(idx as usize).copied().unwrap_or(self.nil)
    }

    #[inline]
    fn set(&mut self, idx: u16, value: ObjId) {
        let idx = idx as usize;
        if idx >= self.regs.len() {
            self.regs.resize(idx + 1, self.nil);
        }
        self.regs[idx] = value;
    }

    fn symbol(&self, idx: u16) -> VmResult<&'a str> {
        self.rep.symbol(idx as usize).ok_or(RuntimeError::IndexOutOfRange {
            kind: "symbol table",
            index: idx as i64,
            len: self.rep.symbol_table.len(),
        })
    }

    fn literal(&self, idx: u16) -> VmResult<&'a str> {
        match self.rep.literal(idx as usize) {
            Some(Literal::String(s)) => Ok(s),
            None => Err(RuntimeError::IndexOutOfRange {
                kind: "literal pool",
                index: idx as i64,
                len: self.rep.literal_pool.len(),
            }),
        }
    }

    fn child(&self, idx: u16) -> VmResult<&'a Rep> {
        self.rep.child(idx as usize).ok_or(RuntimeError::IndexOutOfRange {
            kind: "child records",
            index: idx as i64,
            len: self.rep.children.len(),
        })
    }

    /// `R[from]..R[from + count - 1]`.
    fn span(&self, from: u16, count: u16) -> Vec<ObjId> {
        (0..count).map(|i| self.get(from + i)).collect()
    }
}

enum Flow {
    Next,
    Jump(usize),
    Return(ObjId),
}

/// Execute `rep` to completion.
///
/// Each evaluation owns its register file: `R0` holds `self` and the
/// arguments follow from `R1`. Returns the value of the first `RETURN`, or
/// `nil` on `STOP` or when control runs off the end of the code.
pub fn eval<'a>(
    rt: &mut Runtime<'a>,
    rep: &'a Rep,
    ctx: Context,
    args: &[ObjId],
) -> VmResult<ObjId> {
    let nil = rt.nil();
    let size = (rep.register_count as usize).max(args.len() + 1);
    let mut frame = Frame {
        rep,
        regs: vec![nil; size],
        ctx,
        nil,
    };
    frame.regs[0] = frame.ctx.self_obj;
    frame.regs[1..=args.len()].copy_from_slice(args);

    let mut pc = 0;
    while let Some(&instr) = rep.instructions.get(pc) {
        trace!("{:04x}: {instr}", rep.offsets[pc]);
        match step(rt, &mut frame, pc, instr)? {
            Flow::Next => pc += 1,
            Flow::Jump(target) => pc = target,
            Flow::Return(value) => return Ok(value),
        }
    }
    Ok(nil)
}

fn jump(frame: &Frame<'_>, at: usize, instr: Instruction) -> VmResult<Flow> {
    let rel = instr.jump_offset().unwrap_or(0) as i64;
    let target = frame.rep.offsets[at] as i64 + instr.encoded_len() as i64 + rel;
    u32::try_from(target)
        .ok()
        .and_then(|offset| frame.rep.position_of(offset))
        .map(Flow::Jump)
        .ok_or(RuntimeError::InvalidJumpTarget { offset: target })
}

fn step<'a>(
    rt: &mut Runtime<'a>,
    frame: &mut Frame<'a>,
    at: usize,
    instr: Instruction,
) -> VmResult<Flow> {
    let Instruction { op, a, b, c } = instr;
    match op {
        Op::Nop => {}
        Op::Move => frame.set(a, frame.get(b)),

        Op::LoadL => {
            let s = frame.literal(b)?;
            let value = rt.new_string(s);
            frame.set(a, value);
        }
        Op::LoadI => load_int(rt, frame, a, b as i64),
        Op::LoadINeg => load_int(rt, frame, a, -(b as i64)),
        Op::LoadIMinus1 => load_int(rt, frame, a, -1),
        Op::LoadI0 => load_int(rt, frame, a, 0),
        Op::LoadI1 => load_int(rt, frame, a, 1),
        Op::LoadI2 => load_int(rt, frame, a, 2),
        Op::LoadI3 => load_int(rt, frame, a, 3),
        Op::LoadI4 => load_int(rt, frame, a, 4),
        Op::LoadI5 => load_int(rt, frame, a, 5),
        Op::LoadI6 => load_int(rt, frame, a, 6),
        Op::LoadI7 => load_int(rt, frame, a, 7),
        Op::LoadI16 => load_int(rt, frame, a, b as i16 as i64),
        Op::LoadI32 => {
            let value = (((b as u32) << 16) | c as u32) as i32;
            load_int(rt, frame, a, value as i64);
        }
        Op::LoadSym => {
            let value = rt.new_symbol(frame.symbol(b)?);
            frame.set(a, value);
        }
        Op::LoadNil => frame.set(a, rt.nil()),
        Op::LoadSelf => frame.set(a, frame.ctx.self_obj),
        Op::LoadT => frame.set(a, rt.bool(true)),
        Op::LoadF => frame.set(a, rt.bool(false)),

        Op::GetGV => frame.set(a, rt.global(frame.symbol(b)?)),
        Op::SetGV => rt.set_global(frame.symbol(b)?, frame.get(a)),
        Op::GetIV => {
            let value = rt.ivar_get(frame.ctx.self_obj, frame.symbol(b)?);
            frame.set(a, value);
        }
        Op::SetIV => {
            rt.ivar_set(frame.ctx.self_obj, frame.symbol(b)?, frame.get(a))
        }
        Op::GetCV => {
            let name = frame.symbol(b)?;
            let holder = class_var_holder(rt, frame.ctx.target_class, name)?
                .ok_or_else(|| {
                    RuntimeError::UninitializedClassVariable(name.to_string())
                })?;
            frame.set(a, rt.ivar_get(holder, name));
        }
        Op::SetCV => {
            let name = frame.symbol(b)?;
            let holder = class_var_holder(rt, frame.ctx.target_class, name)?
                .unwrap_or(frame.ctx.target_class);
            rt.ivar_set(holder, name, frame.get(a));
        }
        Op::GetConst => {
            let name = frame.symbol(b)?;
            let value = rt.constant(name).ok_or_else(|| {
                RuntimeError::UninitializedConstant(name.to_string())
            })?;
            frame.set(a, value);
        }
        Op::SetConst => rt.set_constant(frame.symbol(b)?, frame.get(a)),

        Op::GetIdx => {
            let value = rt.invoke(frame.get(a), "[]", &[frame.get(a + 1)])?;
            frame.set(a, value);
        }
        Op::SetIdx => {
            let args = [frame.get(a + 1), frame.get(a + 2)];
            rt.invoke(frame.get(a), "[]=", &args)?;
        }

        Op::Jmp => return jump(frame, at, instr),
        Op::JmpIf if rt.truthy(frame.get(a)) => return jump(frame, at, instr),
        Op::JmpNot if !rt.truthy(frame.get(a)) => return jump(frame, at, instr),
        Op::JmpNil if frame.get(a) == rt.nil() => return jump(frame, at, instr),
        Op::JmpIf | Op::JmpNot | Op::JmpNil => {}
        Op::JmpUw => {
            if frame.rep.catch_count > 0 {
                return Err(RuntimeError::NotImplemented(op));
            }
            return jump(frame, at, instr);
        }

        Op::SSend | Op::SSendB => {
            let receiver = frame.ctx.self_obj;
            send(rt, frame, instr, receiver, op == Op::SSendB)?;
        }
        Op::Send | Op::SendB => {
            let receiver = frame.get(a);
            send(rt, frame, instr, receiver, op == Op::SendB)?;
        }
        Op::Super => {
            let value = call_super(rt, frame, instr)?;
            frame.set(a, value);
        }
        // arguments are placed by the caller
        Op::Enter => {}

        Op::Return | Op::ReturnBlk => return Ok(Flow::Return(frame.get(a))),

        Op::Add => binary(rt, frame, a, "+")?,
        Op::Sub => binary(rt, frame, a, "-")?,
        Op::Mul => binary(rt, frame, a, "*")?,
        Op::Div => binary(rt, frame, a, "/")?,
        Op::Eq => binary(rt, frame, a, "==")?,
        Op::Lt => binary(rt, frame, a, "<")?,
        Op::Le => binary(rt, frame, a, "<=")?,
        Op::Gt => binary(rt, frame, a, ">")?,
        Op::Ge => binary(rt, frame, a, ">=")?,
        Op::AddI => {
            let rhs = rt.new_integer(b as i64);
            let value = rt.invoke(frame.get(a), "+", &[rhs])?;
            frame.set(a, value);
        }
        Op::SubI => {
            let rhs = rt.new_integer(b as i64);
            let value = rt.invoke(frame.get(a), "-", &[rhs])?;
            frame.set(a, value);
        }

        Op::Array => {
            let value = rt.new_array(frame.span(a, b));
            frame.set(a, value);
        }
        Op::Array2 => {
            let value = rt.new_array(frame.span(b, c));
            frame.set(a, value);
        }
        Op::AryCat => {
            let rest = splat(rt, frame.get(a + 1));
            let target = frame.get(a);
            if target == rt.nil() {
                let value = rt.new_array(rest);
                frame.set(a, value);
            } else {
                array_mut(rt, target)?.extend(rest);
            }
        }
        Op::AryPush => {
            let items = frame.span(a + 1, b);
            array_mut(rt, frame.get(a))?.extend(items);
        }
        Op::AryDup => {
            let items = splat(rt, frame.get(a));
            let value = rt.new_array(items);
            frame.set(a, value);
        }
        Op::ARef => {
            let source = frame.get(b);
            let value = match rt.array_items(source) {
                Some(items) => items.get(c as usize).copied().unwrap_or(rt.nil()),
                None if c == 0 => source,
                None => rt.nil(),
            };
            frame.set(a, value);
        }
        Op::ASet => {
            let nil = rt.nil();
            let value = frame.get(a);
            let items = array_mut(rt, frame.get(b))?;
            let idx = c as usize;
            if idx >= items.len() {
                items.resize(idx + 1, nil);
            }
            items[idx] = value;
        }
        Op::APost => post_splat(rt, frame, a, b as usize, c),

        Op::Intern => {
            let value = frame.get(a);
            let name = rt
                .str_value(value)
                .map(str::to_string)
                .ok_or_else(|| type_error(rt, "String", value))?;
            let sym = rt.new_symbol(name);
            frame.set(a, sym);
        }
        Op::Symbol => {
            let value = rt.new_symbol(frame.literal(b)?);
            frame.set(a, value);
        }
        Op::String => {
            let value = rt.new_string(frame.literal(b)?);
            frame.set(a, value);
        }
        Op::StrCat => {
            let piece = frame.get(a + 1);
            let piece = match rt.str_value(piece) {
                Some(s) => s.to_string(),
                None => rt.to_str(piece)?,
            };
            let target = frame.get(a);
            let got = type_error(rt, "String", target);
            rt.string_mut(target).ok_or(got)?.push_str(&piece);
        }

        Op::Hash => {
            let pairs = (0..b)
                .map(|i| (frame.get(a + 2 * i), frame.get(a + 2 * i + 1)))
                .collect();
            let value = rt.new_hash(pairs);
            frame.set(a, value);
        }
        Op::HashAdd => {
            let hash = expect_hash(rt, frame.get(a))?;
            for i in 0..b {
                let key = frame.get(a + 1 + 2 * i);
                let value = frame.get(a + 2 + 2 * i);
                rt.hash_set(hash, key, value);
            }
        }
        Op::HashCat => {
            let hash = expect_hash(rt, frame.get(a))?;
            let other = frame.get(a + 1);
            if other != rt.nil() {
                let pairs = rt
                    .hash_pairs(other)
                    .map(<[_]>::to_vec)
                    .ok_or_else(|| type_error(rt, "Hash", other))?;
                for (key, value) in pairs {
                    rt.hash_set(hash, key, value);
                }
            }
        }

        Op::RangeInc | Op::RangeExc => {
            let value =
                rt.new_range(frame.get(a), frame.get(a + 1), op == Op::RangeExc);
            frame.set(a, value);
        }

        Op::OClass => frame.set(a, rt.special().object),
        Op::Class => {
            let superclass = frame.get(a + 1);
            let superclass = (superclass != rt.nil()).then_some(superclass);
            let class = open_class(rt, frame.symbol(b)?, superclass)?;
            frame.set(a, class);
        }
        Op::Module => {
            let module = open_module(rt, frame.symbol(b)?)?;
            frame.set(a, module);
        }
        Op::Exec => {
            let class = frame.get(a);
            let body = frame.child(b)?;
            // the class body gets its own context; ours is untouched
            let value = eval(rt, body, Context::class_body(class), &[])?;
            frame.set(a, value);
        }
        Op::Method => {
            let body = frame.child(b)?;
            let value = rt.new_method(crate::object::Method::Bytecode(body));
            frame.set(a, value);
        }
        Op::Def => {
            let name = frame.symbol(b)?;
            let body = frame.get(a + 1);
            let method = match &rt.object(body).payload {
                Payload::Method(method) => method.clone(),
                _ => return Err(type_error(rt, "Proc", body)),
            };
            debug!("def {}#{name}", rt.class_name(frame.get(a)));
            rt.define_method(frame.get(a), name, method)?;
            let sym = rt.new_symbol(name);
            frame.set(a, sym);
        }
        Op::Undef => rt.undef_method(frame.ctx.target_class, frame.symbol(a)?)?,
        Op::SClass => {
            let singleton = rt.singleton_class_of(frame.get(a));
            frame.set(a, singleton);
        }
        Op::TClass => frame.set(a, frame.ctx.target_class),

        Op::Debug => debug!("DEBUG {a} {b} {c}"),
        Op::Err => {
            return Err(RuntimeError::LocalJump(frame.literal(a)?.to_string()));
        }
        Op::Stop => return Ok(Flow::Return(rt.nil())),

        Op::GetSV
        | Op::SetSV
        | Op::GetMCnst
        | Op::SetMCnst
        | Op::GetUpvar
        | Op::SetUpvar
        | Op::Except
        | Op::Rescue
        | Op::RaiseIf
        | Op::Call
        | Op::ArgAry
        | Op::KeyP
        | Op::KeyEnd
        | Op::KArg
        | Op::Break
        | Op::BlkPush
        | Op::Lambda
        | Op::Block
        | Op::Alias
        | Op::Ext1
        | Op::Ext2
        | Op::Ext3 => return Err(RuntimeError::NotImplemented(op)),
    }
    Ok(Flow::Next)
}

#[inline]
fn load_int(rt: &mut Runtime<'_>, frame: &mut Frame<'_>, a: u16, value: i64) {
    let value = rt.new_integer(value);
    frame.set(a, value);
}

/// `R[a] = R[a] <op> R[a+1]`, always through method dispatch.
fn binary(
    rt: &mut Runtime<'_>,
    frame: &mut Frame<'_>,
    a: u16,
    name: &str,
) -> VmResult<()> {
    let value = rt.invoke(frame.get(a), name, &[frame.get(a + 1)])?;
    frame.set(a, value);
    Ok(())
}

/// `SEND` and friends. `c` packs the positional count in its low nibble and
/// the keyword count in its high nibble; a positional count of 15 means the
/// arguments come as one array in `R[a+1]`.
fn send(
    rt: &mut Runtime<'_>,
    frame: &mut Frame<'_>,
    instr: Instruction,
    receiver: ObjId,
    with_block: bool,
) -> VmResult<()> {
    let Instruction { op, a, b, c } = instr;
    let (args, used) = call_args(rt, frame, op, a, c)?;
    if with_block && frame.get(a + used + 1) != rt.nil() {
        return Err(RuntimeError::NotImplemented(op));
    }
    let name = frame.symbol(b)?;
    let value = rt.invoke(receiver, name, &args)?;
    frame.set(a, value);
    Ok(())
}

/// Arguments following `R[a]` and how many registers they occupy.
fn call_args(
    rt: &Runtime<'_>,
    frame: &Frame<'_>,
    op: Op,
    a: u16,
    packed: u16,
) -> VmResult<(Vec<ObjId>, u16)> {
    let positional = packed & 0x0F;
    let keywords = (packed >> 4) & 0x0F;
    if keywords != 0 {
        return Err(RuntimeError::NotImplemented(op));
    }
    if positional == 15 {
        let array = frame.get(a + 1);
        let items = rt
            .array_items(array)
            .map(<[_]>::to_vec)
            .ok_or_else(|| type_error(rt, "Array", array))?;
        return Ok((items, 1));
    }
    Ok((frame.span(a + 1, positional), positional))
}

/// Re-dispatch the running method's name above the class that defined it.
fn call_super(
    rt: &mut Runtime<'_>,
    frame: &mut Frame<'_>,
    instr: Instruction,
) -> VmResult<ObjId> {
    let Some(active) = frame.ctx.method.clone() else {
        return Err(RuntimeError::SuperOutsideMethod);
    };
    let (args, _) = call_args(rt, frame, instr.op, instr.a, instr.b)?;
    let receiver = frame.ctx.self_obj;

    // a singleton method's super continues in the receiver's real class
    let start = if rt.object(receiver).singleton == Some(active.owner) {
        Some(rt.class_of(receiver))
    } else {
        rt.superclass_of(active.owner)
    };
    let found = rt.lookup_from(start, &active.name)?.ok_or_else(|| {
        RuntimeError::MethodNotFound {
            name: active.name.clone(),
            receiver: rt.describe(receiver),
        }
    })?;
    rt.call_found(receiver, found, &active.name, &args)
}

/// The class on the chain from `start` holding class variable `name`.
fn class_var_holder(
    rt: &Runtime<'_>,
    start: ObjId,
    name: &str,
) -> VmResult<Option<ObjId>> {
    let mut current = Some(start);
    let mut hops = 0;
    while let Some(class) = current {
        if rt.object(class).ivars.contains_key(name) {
            return Ok(Some(class));
        }
        hops += 1;
        if hops > rt.config().max_class_depth {
            return Err(RuntimeError::ClassChainTooDeep(rt.class_name(start)));
        }
        current = rt.superclass_of(class);
    }
    Ok(None)
}

/// Open the class `name`, creating it unless a constant already names one.
fn open_class(
    rt: &mut Runtime<'_>,
    name: &str,
    superclass: Option<ObjId>,
) -> VmResult<ObjId> {
    if let Some(existing) = rt.constant(name) {
        match rt.class_data(existing) {
            Some(data) if !data.is_module => {
                if superclass.is_some_and(|s| data.superclass != Some(s)) {
                    return Err(RuntimeError::SuperclassMismatch(name.to_string()));
                }
                return Ok(existing);
            }
            _ => return Err(type_error(rt, "Class", existing)),
        }
    }
    let superclass = superclass.unwrap_or(rt.special().object);
    match rt.class_data(superclass) {
        Some(data) if !data.is_module => {}
        _ => return Err(type_error(rt, "Class", superclass)),
    }
    let class = rt.define_class(name, superclass);
    rt.set_constant(name, class);
    Ok(class)
}

fn open_module(rt: &mut Runtime<'_>, name: &str) -> VmResult<ObjId> {
    if let Some(existing) = rt.constant(name) {
        return match rt.class_data(existing) {
            Some(data) if data.is_module => Ok(existing),
            _ => Err(type_error(rt, "Module", existing)),
        };
    }
    let module = rt.define_module(name);
    rt.set_constant(name, module);
    Ok(module)
}

/// Elements of an array, `[]` for `nil`, or the value itself.
fn splat(rt: &Runtime<'_>, value: ObjId) -> Vec<ObjId> {
    match rt.array_items(value) {
        Some(items) => items.to_vec(),
        None if value == rt.nil() => Vec::new(),
        None => vec![value],
    }
}

/// `*R[a], R[a+1]..R[a+post] = R[a][pre..]`
fn post_splat(
    rt: &mut Runtime<'_>,
    frame: &mut Frame<'_>,
    a: u16,
    pre: usize,
    post: u16,
) {
    let items = splat(rt, frame.get(a));
    let post_len = post as usize;
    let nil = rt.nil();
    let (rest, tail) = if items.len() > pre + post_len {
        let split = items.len() - post_len;
        (items[pre..split].to_vec(), items[split..].to_vec())
    } else {
        let tail = (0..post_len)
            .map(|i| items.get(pre + i).copied().unwrap_or(nil))
            .collect();
        (Vec::new(), tail)
    };
    let rest = rt.new_array(rest);
    frame.set(a, rest);
    for (i, value) in tail.into_iter().enumerate() {
        frame.set(a + 1 + i as u16, value);
    }
}

fn array_mut<'r>(
    rt: &'r mut Runtime<'_>,
    value: ObjId,
) -> VmResult<&'r mut Vec<ObjId>> {
    let got = type_error(rt, "Array", value);
    rt.array_mut(value).ok_or(got)
}

fn expect_hash(rt: &Runtime<'_>, value: ObjId) -> VmResult<ObjId> {
    match rt.hash_pairs(value) {
        Some(_) => Ok(value),
        None => Err(type_error(rt, "Hash", value)),
    }
}

fn type_error(rt: &Runtime<'_>, expected: &'static str, value: ObjId) -> RuntimeError {
    crate::primitives::type_error(rt, expected, value)
}

#[cfg(test)]
mod tests {
    use std::io;

    use bytecode::{Image, ImageBuilder, RepBuilder};

    use super::*;
    use crate::capture::run_and_capture;
    use crate::config::VmConfig;

    fn image_of(rep: &RepBuilder) -> Image {
        bytecode::load(&ImageBuilder::new().record(rep).into_bytes())
            .expect("load failed")
    }

    /// Run `rep` as a whole program, returning stdout and the outcome.
    fn run_rep(rep: &RepBuilder) -> (String, VmResult<()>) {
        let captured = run_and_capture(&image_of(rep), &VmConfig::default());
        (captured.stdout, captured.result)
    }

    fn run_int(rep: &RepBuilder) -> VmResult<Option<i64>> {
        let image = image_of(rep);
        let mut rt = Runtime::new(io::sink(), io::sink());
        let value = rt.execute(&image)?;
        Ok(rt.integer_value(value))
    }

    /// `def <name>; "<text>"; end`
    fn returns_string(text: &str) -> RepBuilder {
        let mut body = RepBuilder::new(3);
        let lit = body.string(text);
        body.s(Op::Enter, 0).bb(Op::String, 1, lit).b(Op::Return, 1);
        body
    }

    /// Class body defining one method per `(name, body)`.
    fn class_body(methods: Vec<(&str, RepBuilder)>) -> RepBuilder {
        let mut rep = RepBuilder::new(3);
        for (name, method) in methods {
            let child = rep.child(method);
            let sym = rep.symbol(name);
            rep.b(Op::TClass, 1)
                .bb(Op::Method, 2, child)
                .bb(Op::Def, 1, sym);
        }
        rep.b(Op::Return, 1);
        rep
    }

    /// `class <name> < R[2]; <body>; end` into `R1`.
    fn open_class(rep: &mut RepBuilder, name: &str, body: RepBuilder) {
        let sym = rep.symbol(name);
        let child = rep.child(body);
        rep.bb(Op::Class, 1, sym).bb(Op::Exec, 1, child);
    }

    #[test]
    fn adds_two_integers() {
        let mut rep = RepBuilder::new(3);
        rep.bb(Op::LoadI, 1, 1)
            .bb(Op::LoadI, 2, 2)
            .b(Op::Add, 1)
            .b(Op::Return, 1);
        assert_eq!(run_int(&rep), Ok(Some(3)));

        // self's register may be reused
        let mut rep = RepBuilder::new(2);
        rep.bb(Op::LoadI, 0, 1)
            .bb(Op::LoadI, 1, 2)
            .b(Op::Add, 0)
            .b(Op::Return, 0)
            .z(Op::Stop);
        assert_eq!(run_int(&rep), Ok(Some(3)));
    }

    #[test]
    fn falling_off_the_end_yields_nil() {
        let mut rep = RepBuilder::new(2);
        rep.bb(Op::LoadI, 1, 7);
        let image = image_of(&rep);
        let mut rt = Runtime::new(io::sink(), io::sink());
        assert_eq!(rt.execute(&image), Ok(rt.nil()));
    }

    #[test]
    fn class_with_instance_method() {
        // class Foo; def bar; puts "hi"; 42; end; end; p Foo.new.bar
        let mut bar = RepBuilder::new(3);
        let hi = bar.string("hi");
        bar.s(Op::Enter, 0)
            .bb(Op::String, 2, hi)
            .send(Op::SSend, 1, "puts", 1)
            .bb(Op::LoadI, 1, 42)
            .b(Op::Return, 1);

        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadNil, 2);
        open_class(&mut rep, "Foo", class_body(vec![("bar", bar)]));
        let foo = rep.symbol("Foo");
        rep.bb(Op::GetConst, 2, foo)
            .send(Op::Send, 2, "new", 0)
            .send(Op::Send, 2, "bar", 0)
            .send(Op::SSend, 1, "p", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "hi\n42\n");
    }

    #[test]
    fn inherited_methods_and_singleton_override() {
        // class A; def who; "A"; end; end; class B < A; end
        // b = B.new; def b.who; "mine"; end
        // puts B.new.who; puts b.who
        let mut rep = RepBuilder::new(6);
        rep.b(Op::LoadNil, 2);
        open_class(&mut rep, "A", class_body(vec![("who", returns_string("A"))]));
        let a = rep.symbol("A");
        rep.bb(Op::GetConst, 2, a);
        open_class(&mut rep, "B", class_body(vec![]));

        let b = rep.symbol("B");
        let who = rep.symbol("who");
        let mine = rep.child(returns_string("mine"));
        rep.bb(Op::GetConst, 3, b)
            .send(Op::Send, 3, "new", 0)
            .bb(Op::Move, 4, 3)
            .b(Op::SClass, 4)
            .bb(Op::Method, 5, mine)
            .bb(Op::Def, 4, who)
            .bb(Op::GetConst, 2, b)
            .send(Op::Send, 2, "new", 0)
            .send(Op::Send, 2, "who", 0)
            .send(Op::SSend, 1, "puts", 1)
            .bb(Op::Move, 2, 3)
            .send(Op::Send, 2, "who", 0)
            .send(Op::SSend, 1, "puts", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "A\nmine\n");
    }

    #[test]
    fn arithmetic_opcodes_dispatch_to_user_methods() {
        // class Integer; def +(other); "plus"; end; end; puts 1 + 2
        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadNil, 2);
        open_class(
            &mut rep,
            "Integer",
            class_body(vec![("+", returns_string("plus"))]),
        );
        rep.bb(Op::LoadI, 2, 1)
            .bb(Op::LoadI, 3, 2)
            .b(Op::Add, 2)
            .send(Op::SSend, 1, "puts", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "plus\n");
    }

    #[test]
    fn super_continues_above_the_defining_class() {
        // class A; def greet; "A"; end; end
        // class B < A; def greet; super + "B"; end; end
        // puts B.new.greet
        let mut greet = RepBuilder::new(3);
        let lit = greet.string("B");
        greet
            .s(Op::Enter, 0)
            .bb(Op::Super, 1, 0)
            .bb(Op::String, 2, lit)
            .b(Op::Add, 1)
            .b(Op::Return, 1);

        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadNil, 2);
        open_class(&mut rep, "A", class_body(vec![("greet", returns_string("A"))]));
        let a = rep.symbol("A");
        rep.bb(Op::GetConst, 2, a);
        open_class(&mut rep, "B", class_body(vec![("greet", greet)]));
        let b = rep.symbol("B");
        rep.bb(Op::GetConst, 2, b)
            .send(Op::Send, 2, "new", 0)
            .send(Op::Send, 2, "greet", 0)
            .send(Op::SSend, 1, "puts", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "AB\n");
    }

    #[test]
    fn super_at_top_level_fails() {
        let mut rep = RepBuilder::new(2);
        rep.bb(Op::Super, 1, 0).z(Op::Stop);
        assert_eq!(run_rep(&rep).1, Err(RuntimeError::SuperOutsideMethod));
    }

    #[test]
    fn reopening_with_another_superclass_fails() {
        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadNil, 2);
        open_class(&mut rep, "A", class_body(vec![]));
        let string = rep.symbol("String");
        rep.bb(Op::GetConst, 2, string);
        open_class(&mut rep, "A", class_body(vec![]));
        rep.z(Op::Stop);
        assert_eq!(
            run_rep(&rep).1,
            Err(RuntimeError::SuperclassMismatch("A".into()))
        );
    }

    #[test]
    fn attr_accessor_round_trip() {
        // class P; attr_accessor :x; end; o = P.new; o.x = 5; puts o.x; p o
        let mut body = RepBuilder::new(3);
        let x = body.symbol("x");
        body.bb(Op::LoadSym, 2, x)
            .send(Op::SSend, 1, "attr_accessor", 1)
            .b(Op::Return, 1);

        let mut rep = RepBuilder::new(6);
        rep.b(Op::LoadNil, 2);
        open_class(&mut rep, "P", body);
        let p = rep.symbol("P");
        rep.bb(Op::GetConst, 3, p)
            .send(Op::Send, 3, "new", 0)
            .bb(Op::Move, 4, 3)
            .bb(Op::LoadI, 5, 5)
            .send(Op::Send, 4, "x=", 1)
            .bb(Op::Move, 2, 3)
            .send(Op::Send, 2, "x", 0)
            .send(Op::SSend, 1, "puts", 1)
            .bb(Op::Move, 2, 3)
            .send(Op::SSend, 1, "p", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "5\n#<P @x=5>\n");
    }

    #[test]
    fn class_variables_are_shared_down_the_chain() {
        // class A; @@n = 7; def n; @@n; end; end; class B < A; end; p B.new.n
        let mut n = RepBuilder::new(2);
        let cv = n.symbol("@@n");
        n.s(Op::Enter, 0).bb(Op::GetCV, 1, cv).b(Op::Return, 1);

        let mut a_body = RepBuilder::new(3);
        let cv = a_body.symbol("@@n");
        let child = a_body.child(n);
        let name = a_body.symbol("n");
        a_body
            .bb(Op::LoadI, 1, 7)
            .bb(Op::SetCV, 1, cv)
            .b(Op::TClass, 1)
            .bb(Op::Method, 2, child)
            .bb(Op::Def, 1, name)
            .b(Op::Return, 1);

        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadNil, 2);
        open_class(&mut rep, "A", a_body);
        let a = rep.symbol("A");
        rep.bb(Op::GetConst, 2, a);
        open_class(&mut rep, "B", class_body(vec![]));
        let b = rep.symbol("B");
        rep.bb(Op::GetConst, 2, b)
            .send(Op::Send, 2, "new", 0)
            .send(Op::Send, 2, "n", 0)
            .send(Op::SSend, 1, "p", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "7\n");
    }

    #[test]
    fn missing_class_variable_and_constant() {
        let mut rep = RepBuilder::new(2);
        let cv = rep.symbol("@@nope");
        rep.bb(Op::GetCV, 1, cv);
        assert_eq!(
            run_rep(&rep).1,
            Err(RuntimeError::UninitializedClassVariable("@@nope".into()))
        );

        let mut rep = RepBuilder::new(2);
        let name = rep.symbol("Nope");
        rep.bb(Op::GetConst, 1, name);
        assert_eq!(
            run_rep(&rep).1,
            Err(RuntimeError::UninitializedConstant("Nope".into()))
        );
    }

    #[test]
    fn loop_sums_with_jumps() {
        // sum = 0; i = 1; while i <= 5; sum += i; i += 1; end; sum
        let mut rep = RepBuilder::new(5);
        rep.b(Op::LoadI0, 1).b(Op::LoadI1, 2);
        let top = rep.current_offset() as i32;
        rep.bb(Op::Move, 3, 2)
            .bb(Op::LoadI, 4, 5)
            .b(Op::Le, 3)
            // skips the 17 bytes of loop body below
            .bs(Op::JmpNot, 3, 17)
            .bb(Op::Move, 3, 1)
            .bb(Op::Move, 4, 2)
            .b(Op::Add, 3)
            .bb(Op::Move, 1, 3)
            .bb(Op::AddI, 2, 1);
        let back = top - (rep.current_offset() as i32 + 3);
        rep.s(Op::Jmp, back as i16 as u16).b(Op::Return, 1);

        assert_eq!(run_int(&rep), Ok(Some(15)));
    }

    #[test]
    fn jumps_must_land_on_instructions() {
        let mut rep = RepBuilder::new(2);
        rep.s(Op::Jmp, 1).bb(Op::LoadI, 1, 1).b(Op::Return, 1);
        assert_eq!(
            run_rep(&rep).1,
            Err(RuntimeError::InvalidJumpTarget { offset: 4 })
        );

        let mut rep = RepBuilder::new(2);
        rep.s(Op::Jmp, -10i16 as u16);
        assert_eq!(
            run_rep(&rep).1,
            Err(RuntimeError::InvalidJumpTarget { offset: -7 })
        );
    }

    #[test]
    fn unsupported_features_are_reported() {
        let mut rep = RepBuilder::new(2);
        rep.b(Op::Except, 1);
        assert_eq!(run_rep(&rep).1, Err(RuntimeError::NotImplemented(Op::Except)));

        // a real block argument
        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadSelf, 1)
            .bb(Op::LoadI, 2, 1)
            .b(Op::LoadT, 3)
            .send(Op::SendB, 1, "puts", 1);
        assert_eq!(run_rep(&rep).1, Err(RuntimeError::NotImplemented(Op::SendB)));

        // keyword arguments
        let mut rep = RepBuilder::new(4);
        rep.b(Op::LoadSelf, 1).send(Op::Send, 1, "puts", 0x10);
        assert_eq!(run_rep(&rep).1, Err(RuntimeError::NotImplemented(Op::Send)));
    }

    #[test]
    fn err_raises_local_jump() {
        let mut rep = RepBuilder::new(1);
        let msg = rep.string("break from proc-closure");
        rep.b(Op::Err, msg);
        assert_eq!(
            run_rep(&rep).1,
            Err(RuntimeError::LocalJump("break from proc-closure".into()))
        );
    }

    #[test]
    fn unbounded_recursion_is_stopped() {
        // def f; f; end; f
        let mut f = RepBuilder::new(2);
        f.s(Op::Enter, 0).send(Op::SSend, 1, "f", 0).b(Op::Return, 1);

        let mut rep = RepBuilder::new(3);
        let child = rep.child(f);
        let name = rep.symbol("f");
        rep.b(Op::TClass, 1)
            .bb(Op::Method, 2, child)
            .bb(Op::Def, 1, name)
            .send(Op::SSend, 1, "f", 0)
            .z(Op::Stop);

        let image = image_of(&rep);
        let config = VmConfig {
            max_call_depth: 32,
            ..VmConfig::default()
        };
        let captured = run_and_capture(&image, &config);
        assert_eq!(captured.result, Err(RuntimeError::StackTooDeep));
    }

    #[test]
    fn output_before_a_failure_is_kept() {
        let mut rep = RepBuilder::new(3);
        let lit = rep.string("before");
        let name = rep.symbol("Missing");
        rep.bb(Op::String, 2, lit)
            .send(Op::SSend, 1, "puts", 1)
            .bb(Op::GetConst, 1, name);
        let (out, result) = run_rep(&rep);
        assert_eq!(out, "before\n");
        assert!(matches!(result, Err(RuntimeError::UninitializedConstant(_))));
    }

    #[test]
    fn collections_and_splat() {
        // a = [1, 2]; a2 = [*a, 3]; h = {a: a2}; p h; p 1..3
        let mut rep = RepBuilder::new(6);
        let key = rep.symbol("a");
        rep.bb(Op::LoadI, 2, 1)
            .bb(Op::LoadI, 3, 2)
            .bb(Op::Array, 2, 2)
            .b(Op::AryDup, 2)
            .bb(Op::LoadI, 3, 3)
            .bb(Op::AryPush, 2, 1)
            .bb(Op::Move, 3, 2)
            .bb(Op::LoadSym, 2, key)
            .bb(Op::Hash, 2, 1)
            .send(Op::SSend, 1, "p", 1)
            .bb(Op::LoadI, 2, 1)
            .bb(Op::LoadI, 3, 3)
            .b(Op::RangeInc, 2)
            .send(Op::SSend, 1, "p", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "{:a=>[1, 2, 3]}\n1..3\n");
    }

    #[test]
    fn string_interpolation() {
        // "n=#{4}!"
        let mut rep = RepBuilder::new(4);
        let head = rep.string("n=");
        let tail = rep.string("!");
        rep.bb(Op::String, 2, head)
            .bb(Op::LoadI, 3, 4)
            .b(Op::StrCat, 2)
            .bb(Op::String, 3, tail)
            .b(Op::StrCat, 2)
            .send(Op::SSend, 1, "puts", 1)
            .z(Op::Stop);
        assert_eq!(run_rep(&rep), ("n=4!\n".to_string(), Ok(())));
    }

    #[test]
    fn globals_do_not_leak_between_runs() {
        // p $x; $x = 1
        let mut rep = RepBuilder::new(3);
        let gv = rep.symbol("$x");
        rep.bb(Op::GetGV, 2, gv)
            .send(Op::SSend, 1, "p", 1)
            .bb(Op::LoadI, 2, 1)
            .bb(Op::SetGV, 2, gv)
            .z(Op::Stop);
        let image = image_of(&rep);
        let config = VmConfig::default();

        for _ in 0..2 {
            assert_eq!(run_and_capture(&image, &config).stdout, "nil\n");
        }
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| run_and_capture(&image, &config)))
                .collect();
            for handle in handles {
                let captured = handle.join().unwrap();
                assert_eq!(captured.result, Ok(()));
                assert_eq!(captured.stdout, "nil\n");
            }
        });
    }

    #[test]
    fn constants_do_not_leak_between_runs() {
        // X = 1; class Foo; end
        let mut define = RepBuilder::new(3);
        let x = define.symbol("X");
        define.bb(Op::LoadI, 1, 1).bb(Op::SetConst, 1, x).b(Op::LoadNil, 2);
        open_class(&mut define, "Foo", class_body(vec![]));
        define.z(Op::Stop);
        let define = image_of(&define);

        // X, then Foo
        let mut read_x = RepBuilder::new(2);
        let x = read_x.symbol("X");
        read_x.bb(Op::GetConst, 1, x).b(Op::Return, 1);
        let read_x = image_of(&read_x);
        let mut read_foo = RepBuilder::new(2);
        let foo = read_foo.symbol("Foo");
        read_foo.bb(Op::GetConst, 1, foo).b(Op::Return, 1);
        let read_foo = image_of(&read_foo);

        // same runtime: visible
        let mut rt = Runtime::new(io::sink(), io::sink());
        rt.execute(&define).unwrap();
        let value = rt.execute(&read_x).unwrap();
        assert_eq!(rt.integer_value(value), Some(1));
        let class = rt.execute(&read_foo).unwrap();
        assert_eq!(rt.class_name(class), "Foo");

        // fresh runtime: gone
        let mut rt = Runtime::new(io::sink(), io::sink());
        assert_eq!(
            rt.execute(&read_x),
            Err(RuntimeError::UninitializedConstant("X".into()))
        );
        assert_eq!(
            rt.execute(&read_foo),
            Err(RuntimeError::UninitializedConstant("Foo".into()))
        );
    }

    #[test]
    fn callee_registers_are_its_own() {
        // def clobber; r1..r4 = 100; end
        let mut clobber = RepBuilder::new(5);
        clobber.s(Op::Enter, 0);
        for reg in 1..=4 {
            clobber.bb(Op::LoadI, reg, 100);
        }
        clobber.b(Op::Return, 1);

        // a = 7; b = 8; c = clobber; a + b + c
        let mut rep = RepBuilder::new(5);
        let child = rep.child(clobber);
        let name = rep.symbol("clobber");
        rep.b(Op::TClass, 1)
            .bb(Op::Method, 2, child)
            .bb(Op::Def, 1, name)
            .bb(Op::LoadI, 2, 7)
            .bb(Op::LoadI, 3, 8)
            .send(Op::SSend, 4, "clobber", 0)
            .b(Op::Add, 2)
            .bb(Op::Move, 3, 4)
            .b(Op::Add, 2)
            .b(Op::Return, 2);

        assert_eq!(run_int(&rep), Ok(Some(115)));
    }

    #[test]
    fn array_containing_itself_prints() {
        // a = []; a << a; puts a; p a
        let mut rep = RepBuilder::new(4);
        rep.bb(Op::Array, 2, 0)
            .bb(Op::Move, 3, 2)
            .send(Op::Send, 2, "<<", 1)
            .send(Op::SSend, 1, "puts", 1)
            .bb(Op::Move, 2, 3)
            .send(Op::SSend, 1, "p", 1)
            .z(Op::Stop);

        let (out, result) = run_rep(&rep);
        assert_eq!(result, Ok(()));
        assert_eq!(out, "[...]\n[[...]]\n");
    }
}
