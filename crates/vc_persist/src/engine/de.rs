use std::borrow::Cow;

use log::{trace, warn};

use crate::config::UnresolvedTypePolicy;
use crate::context::SerializationContext;
use crate::error::{Error, Result};
use crate::format::{FormatReader, ObjectHeader, Token};
use crate::hash::HashSet;
use crate::hook::{MemberValue, run_chain};
use crate::info::{EnumInfo, ModelInfo, TypeKey};
use crate::member::MemberDescriptor;
use crate::model::{CustomReader, Model, ValueSource};
use crate::value::{EnumValue, Literal, SharedModel, Value, ValueKind};

use super::Engine;

/// Ids of objects whose type was skipped; references to them read as null.
#[derive(Default)]
struct SkippedObjects(HashSet<u32>);

/// An instance under construction.
enum Instance {
    Boxed(Box<dyn Model>),
    Shared(SharedModel),
}

impl Instance {
    /// Runs `f` on the model, holding a shared instance's borrow only for
    /// the duration of the call.
    fn with_model<R>(&mut self, f: impl FnOnce(&mut dyn Model) -> Result<R>) -> Result<R> {
        match self {
            Self::Boxed(model) => f(model.as_mut()),
            Self::Shared(shared) => f(&mut *shared.borrow_mut()?),
        }
    }
}

/// Builds model graphs from a [`FormatReader`].
pub(super) struct Deserializer<'e, 'r> {
    engine: &'e Engine,
    reader: &'r mut dyn FormatReader,
    /// Set once a custom reader has consumed the end of its object.
    custom_ended: bool,
}

impl<'e, 'r> Deserializer<'e, 'r> {
    pub(super) fn new(engine: &'e Engine, reader: &'r mut dyn FormatReader) -> Self {
        Self {
            engine,
            reader,
            custom_ended: false,
        }
    }

    /// Reads a root object that must be exactly `info`, by value.
    pub(super) fn read_root_model(
        &mut self,
        cx: &mut SerializationContext<'_>,
        info: &'static ModelInfo,
    ) -> Result<Box<dyn Model>> {
        match self.reader.read_token(cx, &ValueKind::AnyModel)? {
            Token::Object(header) => match self.read_object(cx, header, Some(info), false)? {
                Value::Model(model) => Ok(model),
                other => Err(Error::mismatch(info.type_path(), other.kind_name())),
            },
            _ => Err(Error::format("the input does not start with an object")),
        }
    }

    pub(super) fn read_value(&mut self, cx: &mut SerializationContext<'_>, kind: &ValueKind) -> Result<Value> {
        match self.reader.read_token(cx, kind)? {
            Token::Null => Ok(Value::Null),
            Token::Reference(id) => Self::read_reference(cx, id, kind),
            Token::Object(header) => {
                let (expected, shared) = match kind.required() {
                    ValueKind::Model(model) => (Some(model.info()), false),
                    ValueKind::Shared(model) => (Some(model.info()), true),
                    ValueKind::AnyModel => (None, true),
                    other => return Err(Error::mismatch(other.name(), header.key.to_string())),
                };
                self.read_object(cx, header, expected, shared)
            }
            Token::Collection(len) => self.read_collection(cx, len, kind),
            Token::Literal(literal) => match kind.required() {
                ValueKind::Enum(info) => Self::read_enum(info, literal),
                _ => Ok(Value::Literal(literal)),
            },
        }
    }

    fn read_reference(cx: &SerializationContext<'_>, id: u32, kind: &ValueKind) -> Result<Value> {
        let Some(shared) = cx.resolve_object(id).cloned() else {
            if cx.scratch().get::<SkippedObjects>().is_some_and(|s| s.0.contains(&id)) {
                return Ok(Value::Null);
            }
            return Err(Error::format(format!("reference to unknown object {id}")));
        };
        trace!("resolved back-reference to object {id}");

        match kind.required() {
            ValueKind::Model(model) => {
                check_type(Some(model.info()), shared.info())?;
                Ok(Value::Model(shared.borrow()?.clone_model()))
            }
            ValueKind::Shared(model) => {
                check_type(Some(model.info()), shared.info())?;
                Ok(Value::Shared(shared))
            }
            ValueKind::AnyModel => Ok(Value::Shared(shared)),
            other => Err(Error::mismatch(other.name(), shared.info().type_path())),
        }
    }

    fn read_enum(info: &'static EnumInfo, literal: Literal) -> Result<Value> {
        let index = match &literal {
            Literal::Str(name) => info.index_of_name(name),
            Literal::Int(discriminant) => info.index_of_discriminant(*discriminant),
            Literal::UInt(discriminant) => i64::try_from(*discriminant)
                .ok()
                .and_then(|d| info.index_of_discriminant(d)),
            _ => None,
        };
        index
            .and_then(|index| EnumValue::new(info, index))
            .map(Value::Enum)
            .ok_or_else(|| Error::UnknownEnumValue {
                enum_path: info.type_path(),
                value: literal.to_string(),
                member: None,
            })
    }

    fn read_collection(
        &mut self,
        cx: &mut SerializationContext<'_>,
        len: usize,
        kind: &ValueKind,
    ) -> Result<Value> {
        let ValueKind::List(element) = kind.required() else {
            return Err(Error::mismatch(kind.name(), "collection"));
        };

        let mut cx = cx.enter(None)?;
        let mut items = Vec::with_capacity(len.min(1024));
        while self.reader.next_element(&mut cx)? {
            let index = items.len();
            let item = self
                .read_value(&mut cx, element)
                .map_err(|e| e.in_member(&format!("[{index}]")))?;
            items.push(item);
        }
        Ok(Value::List(items))
    }

    // -------------------------------------------------------------------------
    // Objects

    fn resolve(&self, cx: &SerializationContext<'_>, key: &TypeKey) -> Result<Option<&'static ModelInfo>> {
        let registry = &self.engine.registry;
        if let Some(info) = registry.get_with_key(key) {
            return Ok(Some(info));
        }
        if let Some(target) = self.engine.redirector.resolve(key)?
            && let Some(info) = registry.get_with_key(&target)
        {
            trace!("`{key}` redirected to `{target}`");
            return Ok(Some(info));
        }
        match cx.config().unresolved_types {
            UnresolvedTypePolicy::Fail => Err(Error::TypeResolution {
                key: key.clone(),
                member: None,
            }),
            UnresolvedTypePolicy::SkipAsNull => {
                warn!("no model registered for `{key}`, reading it as null");
                Ok(None)
            }
        }
    }

    fn read_object(
        &mut self,
        cx: &mut SerializationContext<'_>,
        header: ObjectHeader,
        expected: Option<&'static ModelInfo>,
        shared: bool,
    ) -> Result<Value> {
        let Some(info) = self.resolve(cx, &header.key)? else {
            if let Some(id) = header.id {
                cx.scratch_mut()
                    .get_or_insert_with(SkippedObjects::default)
                    .0
                    .insert(id);
            }
            let mut cx = cx.enter(None)?;
            while self.reader.next_member(&mut cx)?.is_some() {
                self.reader.skip_value(&mut cx)?;
            }
            return Ok(Value::Null);
        };
        check_type(expected, info)?;

        let mut cx = cx.enter(None)?;
        trace!("reading `{}`", info.type_path());

        // Identity-bearing objects are reachable by id before their members
        // are read, so members may refer back to them.
        let mut instance = if shared || header.id.is_some() {
            let handle = info.new_shared();
            if let Some(id) = header.id {
                cx.register_object(id, handle.clone());
            }
            Instance::Shared(handle)
        } else {
            Instance::Boxed(info.new_boxed())
        };

        if info.is_custom() {
            instance.with_model(|model| self.read_custom(&mut cx, info, model))?;
        } else {
            self.read_members(&mut cx, info, &mut instance)?;
        }

        Ok(match instance {
            Instance::Boxed(model) => Value::Model(model),
            Instance::Shared(handle) if shared => Value::Shared(handle),
            Instance::Shared(handle) => Value::Model(handle.borrow()?.clone_model()),
        })
    }

    fn read_members(
        &mut self,
        cx: &mut SerializationContext<'_>,
        info: &'static ModelInfo,
        instance: &mut Instance,
    ) -> Result<()> {
        let members = self.engine.cache.members(info)?;
        let mut seen = HashSet::default();

        while let Some(name) = self.reader.next_member(cx)? {
            let Some(descriptor) = members.get(&name) else {
                self.skip_unknown(cx, info, name)?;
                continue;
            };
            self.read_field(cx, info, descriptor, instance)
                .map_err(|e| e.in_member(descriptor.name()))?;
            seen.insert(descriptor.name());
        }

        if cx.config().require_all_members
            && let Some(missing) = members.iter().find(|d| !seen.contains(d.name()))
        {
            return Err(Error::MissingMember {
                type_path: info.type_path(),
                member: missing.name().to_owned(),
            });
        }
        Ok(())
    }

    fn read_field(
        &mut self,
        cx: &mut SerializationContext<'_>,
        owner: &'static ModelInfo,
        descriptor: &MemberDescriptor,
        instance: &mut Instance,
    ) -> Result<()> {
        trace!("reading member `{}` of `{}`", descriptor.name(), owner.type_path());

        let value = match descriptor.converter() {
            Some(id) => {
                let converter = self.engine.converter(id, owner)?;
                let kind = converter.persisted_kind(descriptor.kind());
                let persisted = self.read_value(cx, &kind)?;
                converter.from_persisted(persisted)?
            }
            None => self.read_value(cx, descriptor.kind())?,
        };

        let mut member = MemberValue::new(descriptor, owner, value);
        run_chain(&self.engine.hooks, &mut member, |hook, member| {
            hook.after_deserialize(member)
        })?;
        if member.is_skipped() {
            trace!("assignment of `{}` skipped by a hook", descriptor.name());
            return Ok(());
        }

        let value = member.into_value();
        let adapter = &self.engine.adapter;
        instance.with_model(|model| adapter.set_member_value(model, descriptor.name(), value))
    }

    fn read_custom(
        &mut self,
        cx: &mut SerializationContext<'_>,
        info: &'static ModelInfo,
        model: &mut dyn Model,
    ) -> Result<()> {
        let custom = model.as_custom_mut().ok_or_else(|| Error::UnsupportedType {
            type_path: Cow::Borrowed(info.type_path()),
            reason: Cow::Borrowed("declared custom but does not implement `CustomSerialize`"),
        })?;

        let outer = core::mem::replace(&mut self.custom_ended, false);
        let result = custom.deserialize_custom(&mut CustomReader::new(&mut *self, &mut *cx));
        let ended = core::mem::replace(&mut self.custom_ended, outer);
        result?;

        if !ended {
            while let Some(name) = self.reader.next_member(cx)? {
                self.skip_unknown(cx, info, name)?;
            }
        }
        Ok(())
    }

    fn skip_unknown(
        &mut self,
        cx: &mut SerializationContext<'_>,
        info: &'static ModelInfo,
        name: String,
    ) -> Result<()> {
        if !cx.config().allow_unknown_members {
            return Err(Error::UnknownMember {
                type_path: info.type_path(),
                member: name,
            });
        }
        warn!("skipping unknown member `{name}` of `{}`", info.type_path());
        self.reader.skip_value(cx)
    }
}

fn check_type(expected: Option<&'static ModelInfo>, found: &'static ModelInfo) -> Result<()> {
    match expected {
        Some(expected) if expected.type_id() != found.type_id() => {
            Err(Error::mismatch(expected.type_path(), found.type_path()))
        }
        _ => Ok(()),
    }
}

impl ValueSource for Deserializer<'_, '_> {
    fn next_member(&mut self, cx: &mut SerializationContext<'_>) -> Result<Option<String>> {
        let name = self.reader.next_member(cx)?;
        if name.is_none() {
            self.custom_ended = true;
        }
        Ok(name)
    }

    fn read_value(&mut self, cx: &mut SerializationContext<'_>, kind: &ValueKind) -> Result<Value> {
        Deserializer::read_value(self, cx, kind)
    }

    fn skip_value(&mut self, cx: &mut SerializationContext<'_>) -> Result<()> {
        self.reader.skip_value(cx)
    }
}
