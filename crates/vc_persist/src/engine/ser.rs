use log::trace;

use crate::context::{RefId, SerializationContext};
use crate::error::{Error, Result};
use crate::format::{FormatWriter, ObjectHeader};
use crate::hook::{MemberValue, run_chain};
use crate::info::ModelInfo;
use crate::member::MemberDescriptor;
use crate::model::{CustomWriter, Model, ValueSink};
use crate::value::{Literal, SharedModel, Value, ValueKind, ValueRef};

use super::Engine;

/// Walks a model graph into a [`FormatWriter`].
pub(super) struct Serializer<'e, 'w> {
    engine: &'e Engine,
    writer: &'w mut dyn FormatWriter,
}

impl<'e, 'w> Serializer<'e, 'w> {
    pub(super) fn new(engine: &'e Engine, writer: &'w mut dyn FormatWriter) -> Self {
        Self { engine, writer }
    }

    /// Writes the root object and completes the output.
    ///
    /// In graph mode the root always gets an id, so members pointing back at
    /// it (through a shared handle to the same instance) become references.
    pub(super) fn write_root(&mut self, cx: &mut SerializationContext<'_>, model: &dyn Model) -> Result<()> {
        let id = RefId::of(model);
        let object_id = cx.config().preserve_graph.then(|| cx.assign_id(id));
        self.write_object(cx, None, model, id, object_id)?;
        self.writer.flush(cx)
    }

    fn write_object(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        model: &dyn Model,
        id: RefId,
        object_id: Option<u32>,
    ) -> Result<()> {
        let info = model.info();
        let mut cx = cx.enter(Some(id))?;

        let header = ObjectHeader {
            key: info.key().clone(),
            id: object_id,
        };
        self.writer.begin_object(&mut cx, name, &header)?;

        if let Some(custom) = model.as_custom() {
            trace!("`{}` writes its own members", info.type_path());
            custom.serialize_custom(&mut CustomWriter::new(&mut *self, &mut cx))?;
        } else {
            let members = self.engine.cache.members(info)?;
            for descriptor in members.iter() {
                self.write_field(&mut cx, info, model, descriptor)
                    .map_err(|e| e.in_member(descriptor.name()))?;
            }
        }

        self.writer.end_object(&mut cx)
    }

    fn write_field(
        &mut self,
        cx: &mut SerializationContext<'_>,
        owner: &'static ModelInfo,
        model: &dyn Model,
        descriptor: &MemberDescriptor,
    ) -> Result<()> {
        let name = descriptor.name();
        let missing = || Error::UnknownMember {
            type_path: owner.type_path(),
            member: name.to_owned(),
        };
        let as_string = descriptor.enum_as_string();

        // Nothing observes the value, so nested models are written in place.
        if self.engine.hooks.is_empty() && descriptor.converter().is_none() {
            let value = self
                .engine
                .adapter
                .member_value_ref(model, name)
                .ok_or_else(missing)?;
            trace!("writing member `{name}` of `{}`", owner.type_path());
            return self.write_value_ref(cx, Some(name), &value, descriptor.kind(), as_string);
        }

        let value = self
            .engine
            .adapter
            .get_member_value(model, name)
            .ok_or_else(missing)?;

        let mut member = MemberValue::new(descriptor, owner, value);
        run_chain(&self.engine.hooks, &mut member, |hook, member| {
            hook.before_serialize(member)
        })?;
        if member.is_skipped() {
            trace!("member `{name}` of `{}` skipped by a hook", owner.type_path());
            return Ok(());
        }

        trace!("writing member `{name}` of `{}`", owner.type_path());
        match descriptor.converter() {
            Some(id) => {
                let converter = self.engine.converter(id, owner)?;
                let persisted = converter.to_persisted(member.value().clone())?;
                let kind = converter.persisted_kind(descriptor.kind());
                self.write_value(cx, Some(name), &persisted, &kind, as_string)?;
            }
            None => self.write_value(cx, Some(name), member.value(), descriptor.kind(), as_string)?,
        }

        for hook in &self.engine.hooks {
            hook.after_serialize(&member)?;
        }
        Ok(())
    }

    fn write_value(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        value: &Value,
        kind: &ValueKind,
        as_string: bool,
    ) -> Result<()> {
        match value {
            Value::Null => self.writer.write_null(cx, name),
            Value::Literal(literal) => self.writer.write_literal(cx, name, literal),
            Value::Enum(value) => {
                let literal = if as_string {
                    Literal::Str(value.name().to_owned())
                } else {
                    Literal::Int(value.discriminant())
                };
                self.writer.write_literal(cx, name, &literal)
            }
            Value::List(items) => {
                let element = element_kind(kind);
                let mut cx = cx.enter(None)?;
                self.writer.begin_collection(&mut cx, name, items.len())?;
                for (index, item) in items.iter().enumerate() {
                    self.write_value(&mut cx, None, item, &element, as_string)
                        .map_err(|e| e.in_member(&format!("[{index}]")))?;
                }
                self.writer.end_collection(&mut cx)
            }
            Value::Model(model) => {
                let model = model.as_ref();
                self.write_object(cx, name, model, RefId::of(model), None)
            }
            Value::Shared(shared) => self.write_shared(cx, name, shared),
        }
    }

    fn write_value_ref(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        value: &ValueRef<'_>,
        kind: &ValueKind,
        as_string: bool,
    ) -> Result<()> {
        match value {
            ValueRef::Owned(value) => self.write_value(cx, name, value, kind, as_string),
            ValueRef::Model(model) => self.write_object(cx, name, *model, RefId::of(*model), None),
            ValueRef::List(items) => {
                let element = element_kind(kind);
                let mut cx = cx.enter(None)?;
                self.writer.begin_collection(&mut cx, name, items.len())?;
                for (index, item) in items.iter().enumerate() {
                    self.write_value_ref(&mut cx, None, item, &element, as_string)
                        .map_err(|e| e.in_member(&format!("[{index}]")))?;
                }
                self.writer.end_collection(&mut cx)
            }
        }
    }

    fn write_shared(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: Option<&str>,
        shared: &SharedModel,
    ) -> Result<()> {
        let id = shared.ref_id();
        let preserve_graph = cx.config().preserve_graph;

        if preserve_graph {
            if let Some(object_id) = cx.written_id(id) {
                trace!("back-reference to object {object_id}");
                return self.writer.write_reference(cx, name, object_id);
            }
        } else if cx.contains_reference(id) {
            return Err(Error::CircularReference {
                type_path: shared.info().type_path(),
                member: None,
            });
        }

        let model = shared.borrow()?;
        let object_id = preserve_graph.then(|| cx.assign_shared_id(shared));
        self.write_object(cx, name, &*model, id, object_id)
    }
}

fn element_kind(kind: &ValueKind) -> ValueKind {
    match kind.required() {
        ValueKind::List(element) => element.as_ref().clone(),
        _ => ValueKind::AnyModel,
    }
}

impl ValueSink for Serializer<'_, '_> {
    fn write_member(
        &mut self,
        cx: &mut SerializationContext<'_>,
        name: &str,
        value: &Value,
        kind: &ValueKind,
    ) -> Result<()> {
        let as_string = kind.enum_info().is_some_and(|info| info.as_string());
        self.write_value(cx, Some(name), value, kind, as_string)
    }
}
