//! Per-thread parameter aggregate.
//!
//! Program-wide state is reached through one struct instance that each
//! thread builds at the top of the entry function: plain "global" variables
//! as fields, plus pointer fields for global and local buffers.

use crate::buffer::{self, BufferId};
use crate::expr::{Node, VarRef};
use crate::render::Emitter;
use crate::session::Session;
use crate::var::VarId;

#[derive(Debug, Clone)]
pub struct Globals {
    struct_name: String,
    instance: String,
    pointer: String,
    fields: Vec<VarRef>,
}

impl Default for Globals {
    fn default() -> Self {
        Self::new()
    }
}

impl Globals {
    #[must_use]
    pub fn new() -> Self {
        Self {
            struct_name: "S0".to_string(),
            instance: "c_0".to_string(),
            pointer: "p_0".to_string(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn pointer(&self) -> &str {
        &self.pointer
    }

    #[must_use]
    pub fn fields(&self) -> &[VarRef] {
        &self.fields
    }

    #[must_use]
    pub fn contains(&self, r: VarRef) -> bool {
        self.fields.contains(&r)
    }

    pub fn render_struct(&self, session: &Session, em: &mut Emitter) {
        em.line(format!("struct {}", self.struct_name));
        em.open();
        for field in &self.fields {
            match *field {
                VarRef::Var(id) => {
                    let var = session.var(id);
                    em.line(format!("{} {};", var.ty, var.name));
                }
                VarRef::Buffer(id) => {
                    if let Some(decl) = buffer::struct_field(session, id) {
                        em.line(decl);
                    }
                }
            }
        }
        em.close_with(";");
    }

    /// Instance declaration and field initialization.
    pub fn render_init(&self, session: &Session, em: &mut Emitter) {
        em.line(format!("struct {} {};", self.struct_name, self.instance));
        em.line(format!(
            "struct {} *{} = &{};",
            self.struct_name, self.pointer, self.instance
        ));
        for field in &self.fields {
            match *field {
                VarRef::Var(id) => {
                    let var = session.var(id);
                    if let Some(init) = &var.init {
                        em.line(format!(
                            "{}->{} = {};",
                            self.pointer,
                            var.name,
                            init.to_source(session)
                        ));
                    }
                }
                VarRef::Buffer(id) => {
                    let name = &session.buffer(id).name;
                    em.line(format!("{}->{name} = {name};", self.pointer));
                }
            }
        }
    }

    /// Checksum contribution of every field.
    pub fn render_hash(&self, session: &Session, em: &mut Emitter) {
        for field in &self.fields {
            match *field {
                VarRef::Var(id) => {
                    let mut access = String::new();
                    session.render_var(id, &mut access);
                    em.line(format!(
                        "transparent_crc({access}, \"{access}\", print_hash_value);"
                    ));
                }
                VarRef::Buffer(id) => buffer::render_hash(session, id, em),
            }
        }
    }
}

impl Session {
    /// Move a scalar into the aggregate.
    pub fn add_global_var(&mut self, id: VarId) {
        let r = VarRef::Var(id);
        if !self.globals.contains(r) {
            self.globals.fields.push(r);
        }
    }

    /// Reach a root buffer through the aggregate pointer.
    pub fn add_global_buffer(&mut self, id: BufferId) {
        let r = VarRef::Buffer(id);
        if !self.globals.contains(r) {
            self.globals.fields.push(r);
            self.buffers.get_mut(id).in_globals = true;
        }
    }
}
