//! Moving question and variable values between typed form and storage.
//!
//! Buffer storages hold raw little-endian bytes, with strings stored as
//! UTF-16LE padded to the slot width. Name/value entries and external
//! variables hold hex text: [`encode_value`] for scalars and buffers,
//! [`encode_utf16`] for strings.

use setup_configstr::encoding::{decode_utf16, decode_value, encode_utf16, encode_value};
use setup_configstr::{ConfigElement, ConfigRequest, ConfigResp};
use setup_types::package::{Addressing, FormKind};
use setup_types::{
    QuestionId, StorageId, TypedValue, ValueKind, VarStoreInfo, VarTarget,
};
use tracing::debug;

use crate::error::{EvalError, EvalResult};
use crate::evaluator::Evaluator;
use crate::form::{FormSet, FormSetHandle, Question};
use crate::host::Host;
use crate::storage::{BufferCopy, Storage, StorageBacking};
use crate::strings::StringTable;

/// Which copy of a value to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// The edit copy.
    Edit,
    /// The committed copy.
    Committed,
    /// The configuration provider or variable store itself.
    Provider,
}

impl ValueSource {
    fn copy(self) -> Option<BufferCopy> {
        match self {
            Self::Edit => Some(BufferCopy::Edit),
            Self::Committed => Some(BufferCopy::Committed),
            Self::Provider => None,
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Locations
// ══════════════════════════════════════════════════════════════════════════════

/// Where a value lives inside its storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Bytes { offset: usize, width: usize },
    Bits { bit_offset: u32, bit_width: u8 },
    Name(String),
}

impl Location {
    pub fn of_question(question: &Question) -> Option<Self> {
        question.addressing.as_ref().map(|addressing| match addressing {
            Addressing::Offset(offset) => Self::Bytes {
                offset: usize::from(*offset),
                width: question.width(),
            },
            Addressing::Bits {
                bit_offset,
                bit_width,
            } => Self::Bits {
                bit_offset: *bit_offset,
                bit_width: *bit_width,
            },
            Addressing::Name(name) => Self::Name(name.clone()),
        })
    }

    pub fn of_var(var: &VarStoreInfo) -> Self {
        match &var.target {
            VarTarget::Offset(offset) => Self::Bytes {
                offset: usize::from(*offset),
                width: usize::from(var.width),
            },
            VarTarget::Name(name) => Self::Name(name.clone()),
        }
    }

    /// The configuration element covering this location. Bit fields map to
    /// the whole bytes they touch.
    pub fn element(&self) -> ConfigElement {
        match self {
            Self::Bytes { offset, width } => ConfigElement::block(clamp_u16(*offset), clamp_u16(*width)),
            Self::Bits {
                bit_offset,
                bit_width,
            } => {
                let (start, len) = bit_window(*bit_offset, *bit_width);
                ConfigElement::block(clamp_u16(start), clamp_u16(len))
            }
            Self::Name(name) => ConfigElement::name(name.clone()),
        }
    }

    fn name(&self) -> EvalResult<&str> {
        match self {
            Self::Name(name) => Ok(name),
            other => Err(EvalError::Malformed(format!(
                "{other:?} cannot address a named storage"
            ))),
        }
    }
}

fn clamp_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Byte range `(start, len)` touched by a bit field.
fn bit_window(bit_offset: u32, bit_width: u8) -> (usize, usize) {
    let start = bit_offset as usize / 8;
    let end = (bit_offset as usize + usize::from(bit_width)).div_ceil(8);
    (start, end - start)
}

fn bit_mask(bit_width: u8) -> u64 {
    if bit_width >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_width) - 1
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Raw slots
// ══════════════════════════════════════════════════════════════════════════════

/// The bytes at `location` inside `block`. Bit fields come back as the
/// extracted value in 8 little-endian bytes.
fn read_slot(block: &[u8], location: &Location) -> EvalResult<Vec<u8>> {
    match location {
        Location::Bytes { offset, width } => block
            .get(*offset..*offset + *width)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| slot_out_of_range(location, block.len())),
        Location::Bits {
            bit_offset,
            bit_width,
        } => {
            let (start, len) = bit_window(*bit_offset, *bit_width);
            let window = block
                .get(start..start + len)
                .ok_or_else(|| slot_out_of_range(location, block.len()))?;
            let mut raw = [0u8; 8];
            raw[..len].copy_from_slice(window);
            let value = (u64::from_le_bytes(raw) >> (bit_offset % 8)) & bit_mask(*bit_width);
            Ok(value.to_le_bytes().to_vec())
        }
        Location::Name(_) => Err(EvalError::Malformed(
            "named location in a buffer storage".into(),
        )),
    }
}

/// Store `data` at `location`. Bit fields are read-modify-write on the
/// bytes they touch; bits outside the field are preserved.
fn write_slot(block: &mut [u8], location: &Location, data: &[u8]) -> EvalResult<()> {
    let size = block.len();
    match location {
        Location::Bytes { offset, width } => {
            let slot = block
                .get_mut(*offset..*offset + *width)
                .ok_or_else(|| slot_out_of_range(location, size))?;
            let n = data.len().min(*width);
            slot.fill(0);
            slot[..n].copy_from_slice(&data[..n]);
            Ok(())
        }
        Location::Bits {
            bit_offset,
            bit_width,
        } => {
            let (start, len) = bit_window(*bit_offset, *bit_width);
            let window = block
                .get_mut(start..start + len)
                .ok_or_else(|| slot_out_of_range(location, size))?;
            let mut raw = [0u8; 8];
            raw[..len].copy_from_slice(window);
            let mut value = [0u8; 8];
            let n = data.len().min(8);
            value[..n].copy_from_slice(&data[..n]);

            let shift = bit_offset % 8;
            let mask = bit_mask(*bit_width) << shift;
            let field = (u64::from_le_bytes(value) << shift) & mask;
            let merged = (u64::from_le_bytes(raw) & !mask) | field;
            window.copy_from_slice(&merged.to_le_bytes()[..len]);
            Ok(())
        }
        Location::Name(_) => Err(EvalError::Malformed(
            "named location in a buffer storage".into(),
        )),
    }
}

fn slot_out_of_range(location: &Location, size: usize) -> EvalError {
    EvalError::StorageIo(format!("{location:?} is outside the {size}-byte storage"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Typed conversion
// ══════════════════════════════════════════════════════════════════════════════

/// Storage image of `value` for a slot of `kind`, padded or truncated to
/// `width` bytes. Values of an incompatible kind yield `Undefined`.
fn encode_slot(
    value: &TypedValue,
    kind: ValueKind,
    width: usize,
    strings: &dyn StringTable,
) -> EvalResult<Vec<u8>> {
    let mut bytes = match (kind, value) {
        (ValueKind::String, TypedValue::String(id)) => {
            let text = strings.get(*id).ok_or(EvalError::Undefined)?;
            text.encode_utf16().flat_map(u16::to_le_bytes).collect()
        }
        (ValueKind::Buffer, TypedValue::Buffer(bytes)) => bytes.clone(),
        (kind, value) if kind.is_integer_like() => {
            let raw = value.as_u64().ok_or(EvalError::Undefined)?;
            TypedValue::from_u64(kind, raw).to_le_bytes()
        }
        _ => return Err(EvalError::Undefined),
    };
    bytes.resize(width, 0);
    Ok(bytes)
}

fn decode_slot(kind: ValueKind, bytes: &[u8], strings: &mut dyn StringTable) -> TypedValue {
    match kind {
        ValueKind::String => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|unit| *unit != 0)
                .collect();
            TypedValue::String(strings.intern(&String::from_utf16_lossy(&units)))
        }
        _ => TypedValue::from_le_bytes(kind, bytes),
    }
}

fn encode_text(
    value: &TypedValue,
    kind: ValueKind,
    width: usize,
    strings: &dyn StringTable,
) -> EvalResult<String> {
    match (kind, value) {
        (ValueKind::String, TypedValue::String(id)) => {
            let text = strings.get(*id).ok_or(EvalError::Undefined)?;
            Ok(encode_utf16(text))
        }
        _ => Ok(encode_value(&encode_slot(value, kind, width, strings)?)),
    }
}

fn decode_text(
    text: &str,
    kind: ValueKind,
    width: usize,
    strings: &mut dyn StringTable,
) -> EvalResult<TypedValue> {
    match kind {
        ValueKind::String => {
            let decoded = decode_utf16(text, 0)?;
            Ok(TypedValue::String(strings.intern(&decoded)))
        }
        _ => {
            let bytes = decode_value(text, width, 0)?;
            Ok(decode_slot(kind, &bytes, strings))
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Storage access
// ══════════════════════════════════════════════════════════════════════════════

/// A value slot: location plus the kind and width of the value in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slot {
    pub location: Location,
    pub kind: ValueKind,
    pub width: usize,
}

fn single_request(storage: &Storage, location: &Location) -> ConfigRequest {
    let mut request = ConfigRequest::new(storage.header());
    request.push(location.element());
    request
}

fn read_storage(
    storage: &Storage,
    strings: &mut dyn StringTable,
    host: &mut Host,
    slot: &Slot,
    source: ValueSource,
) -> EvalResult<TypedValue> {
    match &storage.backing {
        StorageBacking::Buffer(store) | StorageBacking::VariableBuffer { store, .. } => {
            let bytes = match source.copy() {
                Some(copy) => read_slot(store.bytes(copy), &slot.location)?,
                None => {
                    let mut scratch = store.bytes(BufferCopy::Committed).to_vec();
                    if let StorageBacking::VariableBuffer { .. } = storage.backing {
                        let data = host.variables.get_variable(&storage.guid, &storage.name)?;
                        let n = data.len().min(scratch.len());
                        scratch.fill(0);
                        scratch[..n].copy_from_slice(&data[..n]);
                    } else {
                        let text = host
                            .routing
                            .extract_config(&single_request(storage, &slot.location))?;
                        host.routing.config_to_block(&text, &mut scratch)?;
                    }
                    read_slot(&scratch, &slot.location)?
                }
            };
            Ok(decode_slot(slot.kind, &bytes, strings))
        }
        StorageBacking::NameValue(store) => {
            let name = slot.location.name()?;
            let text = match source.copy() {
                Some(copy) => store
                    .get(name, copy)
                    .ok_or_else(|| EvalError::NotFound(format!("entry `{name}`")))?
                    .to_string(),
                None => {
                    let text = host
                        .routing
                        .extract_config(&single_request(storage, &slot.location))?;
                    let resp = ConfigResp::parse(&text)?;
                    resp.value_of(&ConfigElement::name(name))
                        .ok_or_else(|| EvalError::NotFound(format!("entry `{name}`")))?
                        .to_string()
                }
            };
            decode_text(&text, slot.kind, slot.width, strings)
        }
        StorageBacking::Variable { .. } => {
            let name = slot.location.name()?;
            let data = host.variables.get_variable(&storage.guid, name)?;
            let text = String::from_utf8(data)
                .map_err(|_| EvalError::StorageIo(format!("variable `{name}` is not text")))?;
            decode_text(text.trim_end_matches('\0'), slot.kind, slot.width, strings)
        }
    }
}

fn write_storage(
    storage: &mut Storage,
    strings: &dyn StringTable,
    host: &mut Host,
    slot: &Slot,
    value: &TypedValue,
    target: ValueSource,
) -> EvalResult<()> {
    let request = single_request(storage, &slot.location);
    let guid = storage.guid;
    match &mut storage.backing {
        StorageBacking::Buffer(store) => {
            let data = encode_slot(value, slot.kind, slot.width, strings)?;
            match target.copy() {
                Some(copy) => {
                    let mut image = store.bytes(copy).to_vec();
                    write_slot(&mut image, &slot.location, &data)?;
                    store.write_at(copy, 0, &image)
                }
                None => {
                    let mut scratch = store.bytes(BufferCopy::Edit).to_vec();
                    write_slot(&mut scratch, &slot.location, &data)?;
                    let text = host.routing.block_to_config(&request, &scratch)?;
                    host.routing.route_config(&text)?;
                    Ok(())
                }
            }
        }
        StorageBacking::VariableBuffer { store, attributes } => {
            let data = encode_slot(value, slot.kind, slot.width, strings)?;
            match target.copy() {
                Some(copy) => {
                    let mut image = store.bytes(copy).to_vec();
                    write_slot(&mut image, &slot.location, &data)?;
                    store.write_at(copy, 0, &image)
                }
                None => {
                    let mut scratch = store.bytes(BufferCopy::Committed).to_vec();
                    write_slot(&mut scratch, &slot.location, &data)?;
                    host.variables
                        .set_variable(&guid, &storage.name, *attributes, &scratch)?;
                    Ok(())
                }
            }
        }
        StorageBacking::NameValue(store) => {
            let name = slot.location.name()?;
            let text = encode_text(value, slot.kind, slot.width, strings)?;
            match target.copy() {
                Some(copy) => {
                    store.set(name, &text, copy);
                    Ok(())
                }
                None => {
                    let mut resp = ConfigResp::new(request.header.clone());
                    resp.push(ConfigElement::name(name), text);
                    host.routing.route_config(&resp.render())?;
                    Ok(())
                }
            }
        }
        StorageBacking::Variable { attributes } => {
            let name = slot.location.name()?;
            let text = encode_text(value, slot.kind, slot.width, strings)?;
            host.variables
                .set_variable(&guid, name, *attributes, text.as_bytes())?;
            Ok(())
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Evaluator entry points
// ══════════════════════════════════════════════════════════════════════════════

impl Evaluator<'_> {
    pub(crate) fn read_slot_value(
        &mut self,
        handle: FormSetHandle,
        storage: StorageId,
        slot: &Slot,
        source: ValueSource,
    ) -> EvalResult<TypedValue> {
        let FormSet {
            storages, strings, ..
        } = self
            .formsets
            .get_mut(&handle)
            .ok_or_else(|| EvalError::NotFound(format!("form set {handle}")))?;
        let storage = storages
            .get(&storage)
            .ok_or_else(|| EvalError::NotFound(format!("storage {storage}")))?;
        read_storage(storage, &mut **strings, self.host, slot, source)
    }

    pub(crate) fn write_slot_value(
        &mut self,
        handle: FormSetHandle,
        storage: StorageId,
        slot: &Slot,
        value: &TypedValue,
        target: ValueSource,
    ) -> EvalResult<()> {
        let FormSet {
            storages, strings, ..
        } = self
            .formsets
            .get_mut(&handle)
            .ok_or_else(|| EvalError::NotFound(format!("form set {handle}")))?;
        let storage = storages
            .get_mut(&storage)
            .ok_or_else(|| EvalError::NotFound(format!("storage {storage}")))?;
        write_storage(storage, &**strings, self.host, slot, value, target)
    }

    // ── Clock ────────────────────────────────────────────────────────────

    fn clock_value(&mut self, kind: ValueKind) -> EvalResult<TypedValue> {
        let (date, time) = self.host.variables.get_time()?;
        match kind {
            ValueKind::Date => Ok(TypedValue::Date(date)),
            ValueKind::Time => Ok(TypedValue::Time(time)),
            other => Err(EvalError::Malformed(format!(
                "{other} value has no storage and is not a clock field"
            ))),
        }
    }

    fn set_clock(&mut self, value: &TypedValue) -> EvalResult<()> {
        match value {
            TypedValue::Date(date) => Ok(self.host.variables.set_time(Some(*date), None)?),
            TypedValue::Time(time) => Ok(self.host.variables.set_time(None, Some(*time))?),
            _ => Err(EvalError::Undefined),
        }
    }

    // ── Questions ────────────────────────────────────────────────────────

    /// Read a question's value from `source`.
    pub fn read_question(
        &mut self,
        handle: FormSetHandle,
        id: QuestionId,
        source: ValueSource,
    ) -> EvalResult<TypedValue> {
        let fs = self.formset(handle)?;
        let question = fs
            .question(id)
            .ok_or_else(|| EvalError::NotFound(format!("question {id}")))?;
        let form = question.form;
        let standard_map = fs.form(form).is_some_and(|f| f.kind == FormKind::StandardMap);

        if let Some(expr) = question.value_expr {
            return self.evaluate(handle, form, expr);
        }
        if let (Some(expr), true) = (question.read_expr, standard_map) {
            return self.evaluate(handle, form, expr);
        }
        let kind = question.value_kind();
        let Some(storage) = question.storage else {
            return match kind {
                ValueKind::Date | ValueKind::Time => self.clock_value(kind),
                _ => Ok(question.value.clone()),
            };
        };
        let slot = question_slot(question)?;
        self.read_slot_value(handle, storage, &slot, source)
    }

    /// Store a question's value into `target`. Writing the edit copy also
    /// updates the question's cached value.
    pub fn write_question(
        &mut self,
        handle: FormSetHandle,
        id: QuestionId,
        value: &TypedValue,
        target: ValueSource,
    ) -> EvalResult<()> {
        let fs = self.formset(handle)?;
        let question = fs
            .question(id)
            .ok_or_else(|| EvalError::NotFound(format!("question {id}")))?;
        if question.value_expr.is_some() {
            return Ok(());
        }
        let form = question.form;
        let standard_map = fs.form(form).is_some_and(|f| f.kind == FormKind::StandardMap);
        let write_expr = question.write_expr.filter(|_| standard_map);
        let storage = question.storage;
        let clock = matches!(question.value_kind(), ValueKind::Date | ValueKind::Time);
        let slot = match storage {
            Some(_) => Some(question_slot(question)?),
            None => None,
        };

        match (storage, slot) {
            (Some(storage), Some(slot)) => {
                self.write_slot_value(handle, storage, &slot, value, target)?
            }
            _ if clock && target != ValueSource::Committed => self.set_clock(value)?,
            _ => {}
        }
        if target == ValueSource::Edit {
            if let Some(q) = self.formset_mut(handle)?.question_mut(id) {
                q.value = value.clone();
            }
        }
        if let Some(expr) = write_expr {
            if let Err(err) = self.evaluate(handle, form, expr) {
                debug!(question = %id, "write expression failed: {err}");
            }
        }
        Ok(())
    }

    /// Refresh the cached value of questions from their edit copies.
    ///
    /// With `storage` set, only plain storage-bound questions of that
    /// storage are refreshed. Otherwise every question is, computed
    /// questions last so they see the fresh values.
    pub(crate) fn reload_values(
        &mut self,
        handle: FormSetHandle,
        storage: Option<StorageId>,
    ) -> EvalResult<()> {
        let fs = self.formset(handle)?;
        let mut targets: Vec<QuestionId> = fs
            .questions()
            .filter(|q| !is_computed(q))
            .filter(|q| match storage {
                Some(id) => q.storage == Some(id),
                None => true,
            })
            .map(|q| q.id)
            .collect();
        if storage.is_none() {
            targets.extend(fs.questions().filter(|q| is_computed(q)).map(|q| q.id));
        }

        for id in targets {
            match self.read_question(handle, id, ValueSource::Edit) {
                Ok(value) => {
                    if let Some(q) = self.formset_mut(handle)?.question_mut(id) {
                        q.value = value;
                    }
                }
                Err(err) => debug!(formset = %handle, question = %id, "value not loaded: {err}"),
            }
        }
        Ok(())
    }

    // ── Get/Set opcodes ──────────────────────────────────────────────────

    pub(crate) fn get_var(&mut self, var: &VarStoreInfo) -> EvalResult<TypedValue> {
        let frame = self.frame()?;
        match var.storage {
            None => self.clock_value(var.kind),
            Some(storage) => self.read_slot_value(
                frame.formset,
                storage,
                &var_slot(var),
                ValueSource::Edit,
            ),
        }
    }

    pub(crate) fn set_var(&mut self, var: &VarStoreInfo, value: &TypedValue) -> EvalResult<()> {
        let frame = self.frame()?;
        match var.storage {
            None => self.set_clock(value),
            Some(storage) => {
                self.write_slot_value(
                    frame.formset,
                    storage,
                    &var_slot(var),
                    value,
                    ValueSource::Edit,
                )?;
                self.reload_values(frame.formset, Some(storage))
            }
        }
    }
}

fn is_computed(question: &Question) -> bool {
    question.value_expr.is_some() || question.read_expr.is_some()
}

pub(crate) fn question_slot(question: &Question) -> EvalResult<Slot> {
    let location = Location::of_question(question).ok_or_else(|| {
        EvalError::Malformed(format!("question {} has storage but no addressing", question.id))
    })?;
    Ok(Slot {
        location,
        kind: question.value_kind(),
        width: question.width(),
    })
}

fn var_slot(var: &VarStoreInfo) -> Slot {
    Slot {
        location: Location::of_var(var),
        kind: var.kind,
        width: usize::from(var.width),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::PackageStrings;

    #[test]
    fn test_bit_field_write_preserves_neighbours() {
        let mut block = vec![0xFF, 0x00];
        let location = Location::Bits {
            bit_offset: 6,
            bit_width: 4,
        };
        write_slot(&mut block, &location, &[0b0101]).unwrap();
        // bits 6..10 now hold 0101, everything else untouched
        assert_eq!(block, vec![0b0111_1111, 0b0000_0001]);
        assert_eq!(read_slot(&block, &location).unwrap()[0], 0b0101);
    }

    #[test]
    fn test_bit_window_spans_touched_bytes() {
        assert_eq!(bit_window(0, 1), (0, 1));
        assert_eq!(bit_window(7, 2), (0, 2));
        assert_eq!(bit_window(16, 8), (2, 1));
        let location = Location::Bits {
            bit_offset: 12,
            bit_width: 8,
        };
        assert_eq!(location.element(), ConfigElement::block(1, 2));
    }

    #[test]
    fn test_slot_out_of_range() {
        let block = vec![0u8; 2];
        let location = Location::Bytes {
            offset: 1,
            width: 2,
        };
        assert!(matches!(
            read_slot(&block, &location),
            Err(EvalError::StorageIo(_))
        ));
    }

    #[test]
    fn test_string_slot_is_utf16_padded() {
        let mut strings = PackageStrings::new();
        let id = strings.intern("Hi");
        let bytes = encode_slot(&TypedValue::String(id), ValueKind::String, 8, &strings).unwrap();
        assert_eq!(bytes, vec![b'H', 0, b'i', 0, 0, 0, 0, 0]);
        assert_eq!(
            decode_slot(ValueKind::String, &bytes, &mut strings),
            TypedValue::String(id)
        );
    }

    #[test]
    fn test_incompatible_kind_is_undefined() {
        let strings = PackageStrings::new();
        let err = encode_slot(&TypedValue::Buffer(vec![1]), ValueKind::U8, 1, &strings);
        assert_eq!(err, Err(EvalError::Undefined));
    }

    #[test]
    fn test_text_encoding() {
        let mut strings = PackageStrings::new();
        let text = encode_text(&TypedValue::U16(0x1234), ValueKind::U16, 2, &strings).unwrap();
        assert_eq!(text, "1234");
        assert_eq!(
            decode_text("1234", ValueKind::U16, 2, &mut strings).unwrap(),
            TypedValue::U16(0x1234)
        );

        let id = strings.intern("A");
        let text = encode_text(&TypedValue::String(id), ValueKind::String, 2, &strings).unwrap();
        assert_eq!(text, "0041");
        assert_eq!(
            decode_text(&text, ValueKind::String, 2, &mut strings).unwrap(),
            TypedValue::String(id)
        );
    }
}
