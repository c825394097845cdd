use crate::frontend::intern::InternedSymbol;

/// Integer argument registers of the System V calling convention, in order
pub const ARGUMENT_REGISTERS: [X86FullRegister; 6] = [
    X86FullRegister::Rdi,
    X86FullRegister::Rsi,
    X86FullRegister::Rdx,
    X86FullRegister::Rcx,
    X86FullRegister::R8,
    X86FullRegister::R9,
];

/// Registers a callee must hand back unchanged. `rbp` is handled by the frame.
pub const CALLEE_SAVED_REGISTERS: [X86FullRegister; 5] = [
    X86FullRegister::Rbx,
    X86FullRegister::R12,
    X86FullRegister::R13,
    X86FullRegister::R14,
    X86FullRegister::R15,
];

/// A location an abstract machine instruction reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(X86Register),
    /// Byte offset from the frame pointer
    Stack(i64),
    Immediate(i64),
    /// PC-relative global symbol
    Global(InternedSymbol),
    /// Memory pointed to by a register
    Indirect(X86FullRegister),
}

impl From<X86FullRegister> for Operand {
    fn from(register: X86FullRegister) -> Self {
        Operand::Register(register.as_64_bit())
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Register(register) => write!(f, "%{register}"),
            Operand::Stack(offset) => write!(f, "{offset}(%rbp)"),
            Operand::Immediate(value) => write!(f, "${value}"),
            Operand::Global(name) => write!(f, "{name}(%rip)"),
            Operand::Indirect(register) => write!(f, "(%{register})"),
        }
    }
}

/// An abstract machine instruction: a template plus the operands it reads
/// (`` `sN ``), writes (`` `dN ``) and the labels it jumps to (`` `jN ``).
/// A doubled backtick renders as a single one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asm {
    template: &'static str,
    uses: Vec<Operand>,
    defs: Vec<Operand>,
    jumps: Vec<String>,
}

macro_rules! two_operand_instructions {
    ($($mnemonic:ident),* $(,)?) => {
        paste::paste! {
            impl Asm {
                $(
                    pub fn [<$mnemonic q>](source: impl Into<Operand>, destination: impl Into<Operand>) -> Self {
                        Self::new(
                            concat!(stringify!($mnemonic), "q `s0, `d0"),
                            vec![source.into()],
                            vec![destination.into()],
                            vec![],
                        )
                    }
                )*
            }
        }
    };
}

macro_rules! in_place_instructions {
    ($($mnemonic:ident),* $(,)?) => {
        paste::paste! {
            impl Asm {
                $(
                    pub fn [<$mnemonic q>](operand: impl Into<Operand>) -> Self {
                        let operand = operand.into();
                        Self::new(
                            concat!(stringify!($mnemonic), "q `d0"),
                            vec![operand],
                            vec![operand],
                            vec![],
                        )
                    }
                )*
            }
        }
    };
}

macro_rules! jump_instructions {
    ($($mnemonic:ident),* $(,)?) => {
        impl Asm {
            $(
                pub fn $mnemonic(target: impl Into<String>) -> Self {
                    Self::new(
                        concat!(stringify!($mnemonic), " `j0"),
                        vec![],
                        vec![],
                        vec![target.into()],
                    )
                }
            )*
        }
    };
}

two_operand_instructions!(mov, movabs, lea, add, sub, and, or, xor);
in_place_instructions!(neg, not);
jump_instructions!(jmp, je, jne, jl, jle, jg, jge);

impl Asm {
    pub fn new(
        template: &'static str,
        uses: Vec<Operand>,
        defs: Vec<Operand>,
        jumps: Vec<String>,
    ) -> Self {
        Self {
            template,
            uses,
            defs,
            jumps,
        }
    }

    /// `cmpq rhs, lhs` sets the flags for `lhs - rhs`
    pub fn cmpq(rhs: impl Into<Operand>, lhs: impl Into<Operand>) -> Self {
        Self::new("cmpq `s0, `s1", vec![rhs.into(), lhs.into()], vec![], vec![])
    }

    /// `%rdx:%rax = %rax * source`
    pub fn imulq(source: Operand) -> Self {
        Self::new(
            "imulq `s0",
            vec![source, X86FullRegister::Rax.into()],
            vec![X86FullRegister::Rax.into(), X86FullRegister::Rdx.into()],
            vec![],
        )
    }

    /// Signed `%rdx:%rax / source`, quotient in `%rax`, remainder in `%rdx`
    pub fn idivq(source: Operand) -> Self {
        Self::new(
            "idivq `s0",
            vec![source, X86FullRegister::Rax.into(), X86FullRegister::Rdx.into()],
            vec![X86FullRegister::Rax.into(), X86FullRegister::Rdx.into()],
            vec![],
        )
    }

    /// Sign-extends `%rax` into `%rdx`
    pub fn cqto() -> Self {
        Self::new(
            "cqto",
            vec![X86FullRegister::Rax.into()],
            vec![X86FullRegister::Rdx.into()],
            vec![],
        )
    }

    /// Shifts `destination` left by `%cl`
    pub fn salq(destination: impl Into<Operand>) -> Self {
        Self::shift("salq `s0, `d0", destination.into())
    }

    /// Arithmetic right shift of `destination` by `%cl`
    pub fn sarq(destination: impl Into<Operand>) -> Self {
        Self::shift("sarq `s0, `d0", destination.into())
    }

    fn shift(template: &'static str, destination: Operand) -> Self {
        Self::new(
            template,
            vec![Operand::Register(X86FullRegister::Rcx.as_8_bit()), destination],
            vec![destination],
            vec![],
        )
    }

    pub fn pushq(source: impl Into<Operand>) -> Self {
        Self::new("pushq `s0", vec![source.into()], vec![], vec![])
    }

    pub fn popq(destination: impl Into<Operand>) -> Self {
        Self::new("popq `d0", vec![], vec![destination.into()], vec![])
    }

    pub fn call(function: InternedSymbol) -> Self {
        Self::new("call `j0", vec![], vec![], vec![function.value().to_string()])
    }

    pub fn retq() -> Self {
        Self::new("retq", vec![], vec![], vec![])
    }

    pub fn uses(&self) -> &[Operand] {
        &self.uses
    }

    pub fn defs(&self) -> &[Operand] {
        &self.defs
    }

    pub fn jumps(&self) -> &[String] {
        &self.jumps
    }

    /// The target of an unconditional jump
    pub fn jump_target(&self) -> Option<&str> {
        match self.template {
            "jmp `j0" => self.jumps.first().map(String::as_str),
            _ => None,
        }
    }
}

impl core::fmt::Display for Asm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut characters = self.template.chars().peekable();

        while let Some(character) = characters.next() {
            if character != '`' {
                write!(f, "{character}")?;
                continue;
            }

            let Some(kind) = characters.next() else {
                return Err(std::fmt::Error);
            };

            if kind == '`' {
                write!(f, "`")?;
                continue;
            }

            let mut index = 0;
            while let Some(digit) = characters.peek().and_then(|c| c.to_digit(10)) {
                index = index * 10 + digit as usize;
                characters.next();
            }

            match kind {
                's' => write!(f, "{}", self.uses.get(index).ok_or(std::fmt::Error)?)?,
                'd' => write!(f, "{}", self.defs.get(index).ok_or(std::fmt::Error)?)?,
                'j' => write!(f, "{}", self.jumps.get(index).ok_or(std::fmt::Error)?)?,
                _ => return Err(std::fmt::Error),
            }
        }

        Ok(())
    }
}

/// One line of assembly output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Directive(String),
    Label(String),
    Comment(String),
    Instruction(Asm),
}

impl core::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Line::Directive(directive) => write!(f, "\t{directive}"),
            Line::Label(label) => write!(f, "{label}:"),
            Line::Comment(comment) => write!(f, "\t# {comment}"),
            Line::Instruction(asm) => write!(f, "\t{asm}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Assembler {
    lines: Vec<Line>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }

    pub fn emit(&mut self, asm: Asm) {
        self.lines.push(Line::Instruction(asm));
    }

    pub fn directive(&mut self, directive: impl Into<String>) {
        self.lines.push(Line::Directive(directive.into()));
    }

    pub fn comment(&mut self, comment: impl Into<String>) {
        self.lines.push(Line::Comment(comment.into()));
    }

    /// Places a label. An unconditional jump to it right before is dropped.
    pub fn label(&mut self, name: impl Into<String>) {
        let name = name.into();

        if let Some(Line::Instruction(asm)) = self.lines.last() {
            if asm.jump_target() == Some(name.as_str()) {
                self.lines.pop();
            }
        }

        self.lines.push(Line::Label(name));
    }

    pub fn append(&mut self, lines: Vec<Line>) {
        self.lines.extend(lines);
    }

    pub fn function_prologue(&mut self, name: &str, stack_frame_size: usize) {
        self.directive(format!(".globl {name}"));
        self.directive(".section .text");
        self.label(name);

        if stack_frame_size > 0 {
            self.emit(Asm::pushq(X86FullRegister::Rbp));
            self.emit(Asm::movq(X86FullRegister::Rsp, X86FullRegister::Rbp));
            self.emit(Asm::subq(
                Operand::Immediate(stack_frame_size as i64),
                X86FullRegister::Rsp,
            ));
        }
    }

    pub fn function_epilogue(&mut self, exit_label: String, stack_frame_size: usize) {
        self.label(exit_label);

        if stack_frame_size > 0 {
            self.emit(Asm::movq(X86FullRegister::Rbp, X86FullRegister::Rsp));
            self.emit(Asm::popq(X86FullRegister::Rbp));
        }

        self.emit(Asm::retq());
    }
}

/// General Purpose Register 64-bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum X86FullRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl X86FullRegister {
    pub fn as_64_bit(self) -> X86Register {
        match self {
            Self::Rax => X86Register::Rax,
            Self::Rbx => X86Register::Rbx,
            Self::Rcx => X86Register::Rcx,
            Self::Rdx => X86Register::Rdx,
            Self::Rsi => X86Register::Rsi,
            Self::Rdi => X86Register::Rdi,
            Self::Rbp => X86Register::Rbp,
            Self::Rsp => X86Register::Rsp,
            Self::R8 => X86Register::R8,
            Self::R9 => X86Register::R9,
            Self::R10 => X86Register::R10,
            Self::R11 => X86Register::R11,
            Self::R12 => X86Register::R12,
            Self::R13 => X86Register::R13,
            Self::R14 => X86Register::R14,
            Self::R15 => X86Register::R15,
        }
    }

    pub fn as_8_bit(self) -> X86Register {
        match self {
            Self::Rax => X86Register::Al,
            Self::Rbx => X86Register::Bl,
            Self::Rcx => X86Register::Cl,
            Self::Rdx => X86Register::Dl,
            Self::Rsi => X86Register::Sil,
            Self::Rdi => X86Register::Dil,
            Self::Rbp => X86Register::Bpl,
            Self::Rsp => X86Register::Spl,
            Self::R8 => X86Register::R8b,
            Self::R9 => X86Register::R9b,
            Self::R10 => X86Register::R10b,
            Self::R11 => X86Register::R11b,
            Self::R12 => X86Register::R12b,
            Self::R13 => X86Register::R13b,
            Self::R14 => X86Register::R14b,
            Self::R15 => X86Register::R15b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[rustfmt::skip]
pub enum X86Register {
    // 64-bit
    Rax, Rbx, Rcx, Rdx,
    Rsi, Rdi, Rbp, Rsp,
    R8, R9, R10, R11, R12, R13, R14, R15,

    // 8-bit low
    Al, Bl, Cl, Dl,
    Sil, Dil, Bpl, Spl,
    R8b, R9b, R10b, R11b, R12b, R13b, R14b, R15b,
}
