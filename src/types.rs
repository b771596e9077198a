//! The C type tree (spec.md §3 "Type", §4.4).
//!
//! Basic types are preallocated once per [`TypeTable`] and fetched by field
//! access; pointer/array/function/qualified types are structurally interned
//! so two pointers to the same pointee share a handle. Struct and union
//! types are nominal: each declaration gets its own [`TypeId`], and an
//! unqualified struct/union is never structurally compared against another
//! — only a forward declaration and its later completion share an id.

use crate::intern::Symbol;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Bool,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
}

impl IntKind {
    pub fn is_unsigned(self) -> bool {
        matches!(self, IntKind::Bool | IntKind::UChar | IntKind::UShort | IntKind::UInt | IntKind::ULong | IntKind::ULongLong)
    }

    /// Integer conversion rank (C11 §6.3.1.1), used to pick the common type
    /// in the usual arithmetic conversions.
    pub fn rank(self) -> u8 {
        match self {
            IntKind::Bool => 0,
            IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => 2,
            IntKind::Int | IntKind::UInt => 3,
            IntKind::Long | IntKind::ULong => 4,
            IntKind::LongLong | IntKind::ULongLong => 5,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            IntKind::Bool | IntKind::Char | IntKind::SChar | IntKind::UChar => 1,
            IntKind::Short | IntKind::UShort => 2,
            IntKind::Int | IntKind::UInt => 4,
            IntKind::Long | IntKind::ULong | IntKind::LongLong | IntKind::ULongLong => 8,
        }
    }

    pub fn unsigned_counterpart(self) -> IntKind {
        match self {
            IntKind::Char | IntKind::SChar => IntKind::UChar,
            IntKind::Short => IntKind::UShort,
            IntKind::Int => IntKind::UInt,
            IntKind::Long => IntKind::ULong,
            IntKind::LongLong => IntKind::ULongLong,
            k => k,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

impl FloatKind {
    pub fn size(self) -> u32 {
        match self {
            FloatKind::Float => 4,
            FloatKind::Double => 8,
            FloatKind::LongDouble => 16,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            FloatKind::Float => 0,
            FloatKind::Double => 1,
            FloatKind::LongDouble => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Qualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_restrict: bool,
}

impl Qualifiers {
    pub fn is_unqualified(self) -> bool {
        self == Qualifiers::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Struct,
    Union,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub name: Symbol,
    pub ty: TypeId,
    pub bit_width: Option<u32>,
    pub offset: u32,
    /// Bit offset within the storage unit at `offset`, for bitfields.
    pub bit_offset: u32,
}

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub tag: Option<Symbol>,
    pub kind: AggKind,
    pub members: Vec<Member>,
    pub size: u32,
    pub align: u32,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub tag: Option<Symbol>,
    pub underlying: IntKind,
    pub constants: Vec<(Symbol, i64)>,
}

#[derive(Debug, Clone)]
pub enum Type {
    Void,
    Int(IntKind),
    Float(FloatKind),
    Pointer(TypeId),
    Array(TypeId, Option<u64>),
    Function { ret: TypeId, params: Vec<TypeId>, variadic: bool },
    Struct(usize),
    Union(usize),
    Enum(usize),
    Qualified(TypeId, Qualifiers),
}

/// The conversion a binary operand needs before an arithmetic op can read
/// it with a single common type; carried on IR convert ops (`ir::Opcode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOp {
    None,
    IntWiden,
    IntNarrow,
    SignChange,
    IntToFloat,
    FloatToInt,
    FloatRerank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcharWidth {
    Default,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    C89,
    C99,
    C11,
}

#[derive(Debug, Hash, PartialEq, Eq)]
enum TypeKey {
    Pointer(TypeId),
    Array(TypeId, Option<u64>),
    Function(TypeId, Vec<TypeId>, bool),
    Qualified(TypeId, Qualifiers),
}

pub struct TypeTable {
    types: Vec<Type>,
    interned: HashMap<TypeKey, TypeId>,
    aggregates: Vec<Aggregate>,
    enums: Vec<EnumType>,
    pub void_ty: TypeId,
    pub bool_ty: TypeId,
    pub char_ty: TypeId,
    pub schar_ty: TypeId,
    pub uchar_ty: TypeId,
    pub short_ty: TypeId,
    pub ushort_ty: TypeId,
    pub int_ty: TypeId,
    pub uint_ty: TypeId,
    pub long_ty: TypeId,
    pub ulong_ty: TypeId,
    pub longlong_ty: TypeId,
    pub ulonglong_ty: TypeId,
    pub float_ty: TypeId,
    pub double_ty: TypeId,
    pub long_double_ty: TypeId,
    pub wchar_ty: TypeId,
    pub size_t_ty: TypeId,
    pub ptrdiff_t_ty: TypeId,
    pub dialect: Dialect,
    /// Whether plain `char` is signed on the target; x86-64 SysV default is
    /// signed, which is what governs the `'\xff'` boundary case in spec.md §8.
    pub char_is_signed: bool,
}

impl TypeTable {
    pub fn new(dialect: Dialect, wchar_width: WcharWidth) -> Self {
        let mut types = Vec::new();
        let mut push = |t: Type| -> TypeId {
            let id = TypeId(types.len() as u32);
            types.push(t);
            id
        };
        let void_ty = push(Type::Void);
        let bool_ty = push(Type::Int(IntKind::Bool));
        let char_ty = push(Type::Int(IntKind::Char));
        let schar_ty = push(Type::Int(IntKind::SChar));
        let uchar_ty = push(Type::Int(IntKind::UChar));
        let short_ty = push(Type::Int(IntKind::Short));
        let ushort_ty = push(Type::Int(IntKind::UShort));
        let int_ty = push(Type::Int(IntKind::Int));
        let uint_ty = push(Type::Int(IntKind::UInt));
        let long_ty = push(Type::Int(IntKind::Long));
        let ulong_ty = push(Type::Int(IntKind::ULong));
        let longlong_ty = push(Type::Int(IntKind::LongLong));
        let ulonglong_ty = push(Type::Int(IntKind::ULongLong));
        let float_ty = push(Type::Float(FloatKind::Float));
        let double_ty = push(Type::Float(FloatKind::Double));
        let long_double_ty = push(Type::Float(FloatKind::LongDouble));
        let wchar_ty = match wchar_width {
            WcharWidth::Default => int_ty,
            WcharWidth::Short => ushort_ty,
        };
        let size_t_ty = ulong_ty;
        let ptrdiff_t_ty = long_ty;

        TypeTable {
            types,
            interned: HashMap::new(),
            aggregates: Vec::new(),
            enums: Vec::new(),
            void_ty,
            bool_ty,
            char_ty,
            schar_ty,
            uchar_ty,
            short_ty,
            ushort_ty,
            int_ty,
            uint_ty,
            long_ty,
            ulong_ty,
            longlong_ty,
            ulonglong_ty,
            float_ty,
            double_ty,
            long_double_ty,
            wchar_ty,
            size_t_ty,
            ptrdiff_t_ty,
            dialect,
            char_is_signed: true,
        }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    fn intern(&mut self, key: TypeKey, ty: Type) -> TypeId {
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        self.interned.insert(key, id);
        id
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.intern(TypeKey::Pointer(pointee), Type::Pointer(pointee))
    }

    pub fn array_of(&mut self, elem: TypeId, len: Option<u64>) -> TypeId {
        self.intern(TypeKey::Array(elem, len), Type::Array(elem, len))
    }

    pub fn function_of(&mut self, ret: TypeId, params: Vec<TypeId>, variadic: bool) -> TypeId {
        self.intern(TypeKey::Function(ret, params.clone(), variadic), Type::Function { ret, params, variadic })
    }

    pub fn qualified(&mut self, base: TypeId, quals: Qualifiers) -> TypeId {
        if quals.is_unqualified() {
            return base;
        }
        self.intern(TypeKey::Qualified(base, quals), Type::Qualified(base, quals))
    }

    /// Unwraps qualifier wrappers, the only layer that's ever "transparent"
    /// for layout and conversion purposes.
    pub fn unqualified(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Qualified(base, _) => self.unqualified(*base),
            _ => id,
        }
    }

    /// Forward-declares (or begins) a struct/union; always a fresh id, even
    /// for an identically-tagged redeclaration, so the caller (symbol
    /// table) is responsible for finding and completing the right one
    /// rather than this table silently merging them.
    pub fn declare_aggregate(&mut self, tag: Option<Symbol>, kind: AggKind) -> TypeId {
        let idx = self.aggregates.len();
        self.aggregates.push(Aggregate { tag, kind, members: Vec::new(), size: 0, align: 1, complete: false });
        let variant = if kind == AggKind::Struct { Type::Struct(idx) } else { Type::Union(idx) };
        TypeId({
            let id = self.types.len() as u32;
            self.types.push(variant);
            id
        })
    }

    fn aggregate_index(&self, id: TypeId) -> Option<usize> {
        match self.get(id) {
            Type::Struct(i) | Type::Union(i) => Some(*i),
            _ => None,
        }
    }

    pub fn aggregate(&self, id: TypeId) -> Option<&Aggregate> {
        self.aggregate_index(id).map(|i| &self.aggregates[i])
    }

    /// Member spec before layout: name, type, optional bit width.
    pub fn complete_struct(&mut self, id: TypeId, member_specs: Vec<(Symbol, TypeId, Option<u32>)>) {
        let (members, size, align) = self.layout_members(&member_specs);
        let idx = self.aggregate_index(id).expect("complete_struct on non-aggregate id");
        let agg = &mut self.aggregates[idx];
        agg.members = members;
        agg.size = size;
        agg.align = align;
        agg.complete = true;
    }

    pub fn complete_union(&mut self, id: TypeId, member_specs: Vec<(Symbol, TypeId, Option<u32>)>) {
        let mut size = 0u32;
        let mut align = 1u32;
        let mut members = Vec::new();
        for (name, ty, bit_width) in member_specs {
            let msize = self.size_of(ty);
            let malign = self.align_of(ty);
            size = size.max(msize);
            align = align.max(malign);
            members.push(Member { name, ty, bit_width, offset: 0, bit_offset: 0 });
        }
        let idx = self.aggregate_index(id).expect("complete_union on non-aggregate id");
        let agg = &mut self.aggregates[idx];
        agg.members = members;
        agg.size = round_up(size, align.max(1));
        agg.align = align.max(1);
        agg.complete = true;
    }

    /// Packs bitfields into the storage unit of their declared base type,
    /// matching the spec.md §8 boundary case `sizeof(struct{int a:3;int
    /// b:5;}) == 4`: both fields share one `int`-sized storage unit.
    fn layout_members(&self, specs: &[(Symbol, TypeId, Option<u32>)]) -> (Vec<Member>, u32, u32) {
        let mut members = Vec::new();
        let mut offset = 0u32;
        let mut align = 1u32;
        let mut bit_unit: Option<(TypeId, u32, u32)> = None; // (ty, unit_offset, bits_used)
        for (name, ty, bit_width) in specs {
            if let Some(bits) = bit_width {
                let unit_size = self.size_of(*ty) * 8;
                let fits_existing = bit_unit
                    .map(|(unit_ty, _, used)| unit_ty.0 == ty.0 && used + bits <= unit_size)
                    .unwrap_or(false);
                if fits_existing {
                    let (_, unit_offset, used) = bit_unit.unwrap();
                    members.push(Member { name: *name, ty: *ty, bit_width: Some(*bits), offset: unit_offset, bit_offset: used });
                    bit_unit = Some((*ty, unit_offset, used + bits));
                } else {
                    let talign = self.align_of(*ty);
                    let unit_offset = round_up(offset, talign);
                    members.push(Member { name: *name, ty: *ty, bit_width: Some(*bits), offset: unit_offset, bit_offset: 0 });
                    offset = unit_offset + self.size_of(*ty);
                    align = align.max(talign);
                    bit_unit = Some((*ty, unit_offset, *bits));
                }
                continue;
            }
            bit_unit = None;
            let talign = self.align_of(*ty);
            let moffset = round_up(offset, talign);
            members.push(Member { name: *name, ty: *ty, bit_width: None, offset: moffset, bit_offset: 0 });
            offset = moffset + self.size_of(*ty);
            align = align.max(talign);
        }
        let size = round_up(offset, align.max(1));
        (members, size, align.max(1))
    }

    pub fn declare_enum(&mut self, tag: Option<Symbol>, underlying: IntKind, constants: Vec<(Symbol, i64)>) -> TypeId {
        let idx = self.enums.len();
        self.enums.push(EnumType { tag, underlying, constants });
        TypeId({
            let id = self.types.len() as u32;
            self.types.push(Type::Enum(idx));
            id
        })
    }

    pub fn enum_type(&self, id: TypeId) -> Option<&EnumType> {
        match self.get(id) {
            Type::Enum(i) => Some(&self.enums[*i]),
            _ => None,
        }
    }

    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::Void => 0,
            Type::Int(k) => k.size(),
            Type::Float(f) => f.size(),
            Type::Pointer(_) => 8,
            Type::Array(elem, Some(n)) => self.size_of(*elem) * (*n as u32),
            Type::Array(_, None) => 0,
            Type::Function { .. } => 0,
            Type::Struct(i) => self.aggregates[*i].size,
            Type::Union(i) => self.aggregates[*i].size,
            Type::Enum(i) => self.enums[*i].underlying.size(),
            Type::Qualified(base, _) => self.size_of(*base),
        }
    }

    pub fn align_of(&self, id: TypeId) -> u32 {
        match self.get(id) {
            Type::Void => 1,
            Type::Int(k) => k.size(),
            Type::Float(f) => f.size().min(8), // x86-64 SysV caps long double align handling elsewhere
            Type::Pointer(_) => 8,
            Type::Array(elem, _) => self.align_of(*elem),
            Type::Function { .. } => 1,
            Type::Struct(i) => self.aggregates[*i].align,
            Type::Union(i) => self.aggregates[*i].align,
            Type::Enum(i) => self.enums[*i].underlying.size(),
            Type::Qualified(base, _) => self.align_of(*base),
        }
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.get(self.unqualified(id)), Type::Int(_) | Type::Enum(_))
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.get(self.unqualified(id)), Type::Float(_))
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(self.unqualified(id)), Type::Pointer(_))
    }

    pub fn is_arithmetic(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_float(id)
    }

    fn int_kind(&self, id: TypeId) -> Option<IntKind> {
        match self.get(self.unqualified(id)) {
            Type::Int(k) => Some(*k),
            Type::Enum(i) => Some(self.enums[*i].underlying),
            _ => None,
        }
    }

    /// Array-to-pointer and function-to-pointer decay, applied at every
    /// conversion site per spec.md §4.4.
    pub fn decay(&mut self, id: TypeId) -> TypeId {
        match self.get(self.unqualified(id)).clone() {
            Type::Array(elem, _) => self.pointer_to(elem),
            Type::Function { .. } => self.pointer_to(id),
            _ => id,
        }
    }

    /// Integer promotion: anything with rank below `int` promotes to `int`
    /// (or `unsigned int` if `int` can't represent all its values).
    pub fn promote(&self, id: TypeId) -> TypeId {
        match self.int_kind(id) {
            Some(k) if k.rank() < IntKind::Int.rank() => self.int_ty,
            _ => id,
        }
    }

    /// The usual arithmetic conversions (C11 §6.3.1.8): returns the common
    /// type and the conversion each side needs.
    pub fn usual_arithmetic_conversion(&self, lhs: TypeId, rhs: TypeId) -> (TypeId, ConversionOp, ConversionOp) {
        if self.is_float(lhs) || self.is_float(rhs) {
            return self.float_conversion(lhs, rhs);
        }
        let lhs_p = self.promote(lhs);
        let rhs_p = self.promote(rhs);
        let lk = self.int_kind(lhs_p).unwrap_or(IntKind::Int);
        let rk = self.int_kind(rhs_p).unwrap_or(IntKind::Int);
        if lk == rk {
            return (lhs_p, conv_for(lhs, lhs_p), conv_for(rhs, rhs_p));
        }
        let (common, lop, rop) = if lk.rank() == rk.rank() {
            // Same rank, different signedness: convert to the unsigned one.
            if lk.is_unsigned() {
                (lk, ConversionOp::None, ConversionOp::SignChange)
            } else {
                (rk, ConversionOp::SignChange, ConversionOp::None)
            }
        } else {
            let (higher, lower, lower_is_lhs) = if lk.rank() > rk.rank() { (lk, rk, false) } else { (rk, lk, true) };
            if higher.is_unsigned() || !lower.is_unsigned() || higher.size() > lower.size() {
                if lower_is_lhs {
                    (higher, ConversionOp::IntWiden, ConversionOp::None)
                } else {
                    (higher, ConversionOp::None, ConversionOp::IntWiden)
                }
            } else {
                // Lower-ranked unsigned type cannot be represented by the
                // higher signed type: both convert to the unsigned
                // counterpart of the higher type.
                let common = higher.unsigned_counterpart();
                (common, ConversionOp::SignChange, ConversionOp::SignChange)
            }
        };
        let common_id = self.type_id_for_int_kind(common);
        let _ = (lop, rop);
        (common_id, self.conv_between(lhs, common_id), self.conv_between(rhs, common_id))
    }

    fn float_conversion(&self, lhs: TypeId, rhs: TypeId) -> (TypeId, ConversionOp, ConversionOp) {
        let lhs_is_float = self.is_float(lhs);
        let rhs_is_float = self.is_float(rhs);
        if lhs_is_float && rhs_is_float {
            let lf = self.float_kind(lhs);
            let rf = self.float_kind(rhs);
            let common = if lf.rank() >= rf.rank() { lhs } else { rhs };
            (common, self.conv_between(lhs, common), self.conv_between(rhs, common))
        } else if lhs_is_float {
            (lhs, ConversionOp::None, ConversionOp::IntToFloat)
        } else {
            (rhs, ConversionOp::IntToFloat, ConversionOp::None)
        }
    }

    fn float_kind(&self, id: TypeId) -> FloatKind {
        match self.get(self.unqualified(id)) {
            Type::Float(f) => *f,
            _ => FloatKind::Double,
        }
    }

    fn type_id_for_int_kind(&self, kind: IntKind) -> TypeId {
        match kind {
            IntKind::Bool => self.bool_ty,
            IntKind::Char => self.char_ty,
            IntKind::SChar => self.schar_ty,
            IntKind::UChar => self.uchar_ty,
            IntKind::Short => self.short_ty,
            IntKind::UShort => self.ushort_ty,
            IntKind::Int => self.int_ty,
            IntKind::UInt => self.uint_ty,
            IntKind::Long => self.long_ty,
            IntKind::ULong => self.ulong_ty,
            IntKind::LongLong => self.longlong_ty,
            IntKind::ULongLong => self.ulonglong_ty,
        }
    }

    fn conv_between(&self, from: TypeId, to: TypeId) -> ConversionOp {
        if from == to {
            return ConversionOp::None;
        }
        if self.is_float(from) && self.is_integer(to) {
            return ConversionOp::FloatToInt;
        }
        if self.is_integer(from) && self.is_float(to) {
            return ConversionOp::IntToFloat;
        }
        if self.is_float(from) && self.is_float(to) {
            return ConversionOp::FloatRerank;
        }
        let (fk, tk) = (self.int_kind(from), self.int_kind(to));
        match (fk, tk) {
            (Some(f), Some(t)) if f.is_unsigned() != t.is_unsigned() && f.size() == t.size() => ConversionOp::SignChange,
            (Some(f), Some(t)) if f.size() < t.size() => ConversionOp::IntWiden,
            (Some(f), Some(t)) if f.size() > t.size() => ConversionOp::IntNarrow,
            _ => ConversionOp::None,
        }
    }

    /// The dialect-dependent type of an unsuffixed, unsigned-fitting
    /// integer literal written in hex/octal (spec.md §8: `0x80000000` is
    /// `unsigned int` in C89 but `long` in C99/C11, since C99 added `long`
    /// to the hex/octal candidate list ahead of `unsigned int`).
    pub fn hex_or_octal_literal_type(&self, value: u64, is_long_suffix: bool, is_long_long_suffix: bool, is_unsigned_suffix: bool) -> TypeId {
        if is_long_long_suffix {
            return if is_unsigned_suffix || value > i64::MAX as u64 { self.ulonglong_ty } else { self.longlong_ty };
        }
        if is_long_suffix {
            return if is_unsigned_suffix || value > i64::MAX as u64 { self.ulong_ty } else { self.long_ty };
        }
        if is_unsigned_suffix {
            if value <= u32::MAX as u64 {
                return self.uint_ty;
            }
            return if value <= i64::MAX as u64 || self.dialect != Dialect::C89 { self.ulong_ty } else { self.ulonglong_ty };
        }
        let fits_int = value <= i32::MAX as u64;
        let fits_uint = value <= u32::MAX as u64;
        let fits_long = value <= i64::MAX as u64;
        match self.dialect {
            // C89 candidate list: int, unsigned int, long, unsigned long.
            Dialect::C89 => {
                if fits_int {
                    self.int_ty
                } else if fits_uint {
                    self.uint_ty
                } else if fits_long {
                    self.long_ty
                } else {
                    self.ulong_ty
                }
            }
            // C99/C11 candidate list: int, long, unsigned long — `long`
            // comes ahead of `unsigned int` (spec.md §8 boundary case).
            Dialect::C99 | Dialect::C11 => {
                if fits_int {
                    self.int_ty
                } else if fits_long {
                    self.long_ty
                } else {
                    self.ulong_ty
                }
            }
        }
    }

    /// Decimal (non-hex/octal) literal type: never `unsigned` unless
    /// suffixed, per the standard's narrower candidate list for decimal
    /// constants.
    pub fn decimal_literal_type(&self, value: u64, is_long_suffix: bool, is_long_long_suffix: bool, is_unsigned_suffix: bool) -> TypeId {
        if is_long_long_suffix {
            return if is_unsigned_suffix { self.ulonglong_ty } else { self.longlong_ty };
        }
        if is_long_suffix {
            return if is_unsigned_suffix { self.ulong_ty } else { self.long_ty };
        }
        if is_unsigned_suffix {
            return if value <= u32::MAX as u64 { self.uint_ty } else { self.ulong_ty };
        }
        if value <= i32::MAX as u64 {
            self.int_ty
        } else if value <= i64::MAX as u64 {
            self.long_ty
        } else {
            self.ulong_ty
        }
    }

    /// Character constant value under the target's `char` signedness
    /// (spec.md §8: `'\xff'` is 255 if `char` is unsigned, −1 if signed).
    pub fn char_constant_value(&self, raw: i64) -> i64 {
        if self.char_is_signed && (0..=255).contains(&raw) && raw > 127 {
            raw - 256
        } else {
            raw
        }
    }
}

fn conv_for(original: TypeId, promoted: TypeId) -> ConversionOp {
    if original == promoted {
        ConversionOp::None
    } else {
        ConversionOp::IntWiden
    }
}

fn round_up(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::StringInterner;

    #[test]
    fn pointer_types_are_interned_structurally() {
        let mut table = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let p1 = table.pointer_to(table.int_ty);
        let p2 = table.pointer_to(table.int_ty);
        assert_eq!(p1, p2);
    }

    #[test]
    fn unnamed_structs_are_never_structurally_equal() {
        let mut table = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let s1 = table.declare_aggregate(None, AggKind::Struct);
        let s2 = table.declare_aggregate(None, AggKind::Struct);
        assert_ne!(s1, s2);
    }

    #[test]
    fn bitfield_struct_packs_into_one_storage_unit() {
        let mut interner = StringInterner::new();
        let mut table = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let id = table.declare_aggregate(None, AggKind::Struct);
        let a = interner.intern("a");
        let b = interner.intern("b");
        table.complete_struct(id, vec![(a, table.int_ty, Some(3)), (b, table.int_ty, Some(5))]);
        assert_eq!(table.size_of(id), 4);
    }

    #[test]
    fn hex_literal_0x80000000_is_unsigned_int_in_c89_long_in_c99() {
        let c89 = TypeTable::new(Dialect::C89, WcharWidth::Default);
        let c99 = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let value = 0x8000_0000u64;
        assert_eq!(c89.hex_or_octal_literal_type(value, false, false, false), c89.uint_ty);
        assert_eq!(c99.hex_or_octal_literal_type(value, false, false, false), c99.long_ty);
    }

    #[test]
    fn char_constant_0xff_is_negative_one_when_char_is_signed() {
        let table = TypeTable::new(Dialect::C99, WcharWidth::Default);
        assert!(table.char_is_signed);
        assert_eq!(table.char_constant_value(255), -1);
    }

    #[test]
    fn usual_arithmetic_conversion_promotes_char_pair_to_int() {
        let table = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let (common, _, _) = table.usual_arithmetic_conversion(table.char_ty, table.char_ty);
        assert_eq!(common, table.int_ty);
    }

    #[test]
    fn array_and_function_decay_to_pointer() {
        let mut table = TypeTable::new(Dialect::C99, WcharWidth::Default);
        let arr = table.array_of(table.int_ty, Some(10));
        let decayed = table.decay(arr);
        assert!(table.is_pointer(decayed));
    }
}
