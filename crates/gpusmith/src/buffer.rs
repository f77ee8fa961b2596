//! Memory-space-aware buffers.
//!
//! A root buffer owns storage in one of the four memory spaces. Itemizing a
//! root produces a view: a single element addressed by constant or
//! expression indices. Views own nothing; they always render as their root
//! followed by their indices.
//!
//! Emission depends on the space of the root:
//!
//! | space    | declaration                      | initialization                     | hash            |
//! |----------|----------------------------------|------------------------------------|-----------------|
//! | global   | pointer field in the aggregate   | owned item assigned at definition  | owned item      |
//! | local    | `__shared__` array at entry      | leader lane fills, then a barrier  | owned item      |
//! | private  | array at entry                   | brace initializer                  | every element   |
//! | constant | `__constant__` array, file scope | brace initializer                  | never           |

use crate::block::BlockId;
use crate::error::{GenError, Result};
use crate::expr::{Expr, IdKind, Node, VarRef};
use crate::params::KernelParam;
use crate::render::{array_initializer, dims_suffix, Emitter};
use crate::session::Session;
use crate::types::{Qualifiers, ScalarKind, Type};
use serde::{Deserialize, Serialize};

/// Handle into the buffer arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

impl BufferId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemorySpace {
    Global,
    Local,
    Private,
    Constant,
}

impl MemorySpace {
    /// Qualifier on the storage declaration.
    #[must_use]
    pub const fn qualifier(self) -> &'static str {
        match self {
            Self::Global | Self::Private => "",
            Self::Local => "__shared__",
            Self::Constant => "__constant__",
        }
    }

    /// Thread-id query selecting the element a lane owns.
    #[must_use]
    pub const fn owner_id(self) -> Option<IdKind> {
        match self {
            Self::Global => Some(IdKind::LinearGlobal),
            Self::Local => Some(IdKind::LinearLocal),
            Self::Private | Self::Constant => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub name: String,
    pub space: MemorySpace,
    pub elem: Type,
    pub quals: Qualifiers,
    pub init: Option<Expr>,
    pub dims: Vec<usize>,
    /// Root buffer this view indexes; `None` for roots.
    pub collective: Option<BufferId>,
    pub indices: Vec<Expr>,
    /// Enclosing block of an expression-indexed view.
    pub block: Option<BlockId>,
    /// Kernel parameter backing a global root.
    pub param: Option<KernelParam>,
    /// Reached through the parameter aggregate pointer.
    pub in_globals: bool,
    /// Contributes to the thread checksum.
    pub checksummed: bool,
}

impl Buffer {
    #[must_use]
    pub const fn is_view(&self) -> bool {
        self.collective.is_some()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

#[derive(Debug, Default)]
pub struct BufferArena {
    buffers: Vec<Buffer>,
}

impl BufferArena {
    /// New root buffer. Qualifiers are forced to plain mutable storage.
    pub fn create(
        &mut self,
        space: MemorySpace,
        name: impl Into<String>,
        elem: Type,
        init: Option<Expr>,
        dims: Vec<usize>,
    ) -> BufferId {
        self.push(Buffer {
            name: name.into(),
            space,
            elem,
            quals: Qualifiers::mutable(),
            init,
            dims,
            collective: None,
            indices: Vec::new(),
            block: None,
            param: None,
            in_globals: false,
            checksummed: true,
        })
    }

    /// View of one element at constant indices.
    pub fn itemize(&mut self, id: BufferId, indices: &[usize]) -> Result<BufferId> {
        let indices = indices
            .iter()
            .map(|&i| Expr::constant(ScalarKind::Int, i as i64))
            .collect();
        self.itemize_with(id, indices, None)
    }

    /// View of one element at expression indices, scoped to `block`.
    ///
    /// Prefer [`Session::itemize_expr`], which also registers the view as a
    /// local of `block`.
    pub fn itemize_expr(
        &mut self,
        id: BufferId,
        indices: Vec<Expr>,
        block: BlockId,
    ) -> Result<BufferId> {
        self.itemize_with(id, indices, Some(block))
    }

    fn itemize_with(
        &mut self,
        id: BufferId,
        indices: Vec<Expr>,
        block: Option<BlockId>,
    ) -> Result<BufferId> {
        let root = self.get(id);
        if root.is_view() {
            return Err(GenError::AlreadyItemized {
                buffer: root.name.clone(),
            });
        }
        if indices.len() != root.dims.len() {
            return Err(GenError::DimensionMismatch {
                buffer: root.name.clone(),
                expected: root.dims.len(),
                actual: indices.len(),
            });
        }
        let view = Buffer {
            name: root.name.clone(),
            space: root.space,
            elem: root.elem,
            quals: root.quals,
            init: root.init.clone(),
            dims: Vec::new(),
            collective: Some(id),
            indices,
            block,
            param: None,
            in_globals: false,
            checksummed: false,
        };
        Ok(self.push(view))
    }

    fn push(&mut self, buffer: Buffer) -> BufferId {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(buffer);
        id
    }

    #[must_use]
    pub fn get(&self, id: BufferId) -> &Buffer {
        &self.buffers[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: BufferId) -> &mut Buffer {
        &mut self.buffers[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BufferId, &Buffer)> {
        self.buffers
            .iter()
            .enumerate()
            .map(|(i, b)| (BufferId(i as u32), b))
    }

    pub fn roots(&self) -> impl Iterator<Item = (BufferId, &Buffer)> {
        self.iter().filter(|(_, b)| !b.is_view())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Session {
    pub fn create_buffer(
        &mut self,
        space: MemorySpace,
        name: impl Into<String>,
        elem: Type,
        init: Option<Expr>,
        dims: Vec<usize>,
    ) -> BufferId {
        let id = self.buffers.create(space, name, elem, init, dims);
        tracing::trace!(buffer = %self.buffer(id).name, ?space, "created buffer");
        id
    }

    pub fn itemize(&mut self, buffer: BufferId, indices: &[usize]) -> Result<BufferId> {
        self.buffers.itemize(buffer, indices)
    }

    /// Expression-indexed view, registered as a local of `block`.
    pub fn itemize_expr(
        &mut self,
        buffer: BufferId,
        indices: Vec<Expr>,
        block: BlockId,
    ) -> Result<BufferId> {
        let view = self.buffers.itemize_expr(buffer, indices, block)?;
        self.block_mut(block).local_vars.push(VarRef::Buffer(view));
        Ok(view)
    }

    /// Leave `buffer` out of the thread checksum.
    pub fn exclude_from_hash(&mut self, buffer: BufferId) {
        self.buffers.get_mut(buffer).checksummed = false;
    }

    /// Back a global root with a kernel parameter.
    pub fn bind_param(&mut self, buffer: BufferId, param: KernelParam) {
        self.buffers.get_mut(buffer).param = Some(param);
    }
}

/// Access text: the root's name (through the aggregate pointer when it is a
/// field), followed by `[index]` per index for views.
pub fn render_access(session: &Session, id: BufferId, out: &mut String) {
    let buffer = session.buffer(id);
    match buffer.collective {
        None => {
            if buffer.in_globals {
                out.push_str(session.globals().pointer());
                out.push_str("->");
            }
            out.push_str(&buffer.name);
        }
        Some(root) => {
            render_access(session, root, out);
            for index in &buffer.indices {
                out.push('[');
                index.render(session, out);
                out.push(']');
            }
        }
    }
}

/// Access text of the element this lane owns; plain access for spaces
/// without ownership and for views.
#[must_use]
pub fn owned_item(session: &Session, id: BufferId) -> String {
    let mut out = String::new();
    render_access(session, id, &mut out);
    let buffer = session.buffer(id);
    if let (false, Some(owner)) = (buffer.is_view(), buffer.space.owner_id()) {
        out.push('[');
        out.push_str(owner.call());
        out.push(']');
    }
    out
}

/// Field of the parameter aggregate, for global and local roots.
#[must_use]
pub fn struct_field(session: &Session, id: BufferId) -> Option<String> {
    let buffer = session.buffer(id);
    match (buffer.is_view(), buffer.space) {
        (false, MemorySpace::Global | MemorySpace::Local) => {
            Some(format!("{} *{};", buffer.elem, buffer.name))
        }
        _ => None,
    }
}

/// Definition of a root buffer inside the entry function.
///
/// Global roots only get their owned-item initialization here, so callers
/// must emit them after the aggregate pointer is set. Constant roots live at
/// file scope and are emitted by [`render_file_scope_def`].
pub fn render_def(session: &Session, id: BufferId, em: &mut Emitter) {
    let buffer = session.buffer(id);
    if buffer.is_view() {
        return;
    }
    let init = buffer
        .init
        .as_ref()
        .map_or_else(|| "0".to_string(), |e| e.to_source(session));
    match buffer.space {
        MemorySpace::Global => {
            if buffer.init.is_some() {
                em.line(format!("{} = {init};", owned_item(session, id)));
            }
        }
        MemorySpace::Local => {
            em.line(format!(
                "{} {} {}{};",
                buffer.space.qualifier(),
                buffer.elem,
                buffer.name,
                dims_suffix(&buffer.dims)
            ));
            em.line(format!("if ({} == 0)", IdKind::LinearLocal.call()));
            em.open();
            em.line(format!("for (i = 0; i < {}; i++)", buffer.element_count()));
            em.indent();
            em.line(format!("(({} *){})[i] = {init};", buffer.elem, buffer.name));
            em.dedent();
            em.close();
        }
        MemorySpace::Private => {
            em.line(format!(
                "{} {}{} = {};",
                buffer.elem,
                buffer.name,
                dims_suffix(&buffer.dims),
                array_initializer(&buffer.dims, &init)
            ));
        }
        MemorySpace::Constant => {}
    }
}

/// File-scope definition for constant roots.
pub fn render_file_scope_def(session: &Session, id: BufferId, em: &mut Emitter) {
    let buffer = session.buffer(id);
    if buffer.is_view() || buffer.space != MemorySpace::Constant {
        return;
    }
    let init = buffer
        .init
        .as_ref()
        .map_or_else(|| "0".to_string(), |e| e.to_source(session));
    em.line(format!(
        "{} {} {}{} = {};",
        buffer.space.qualifier(),
        buffer.elem,
        buffer.name,
        dims_suffix(&buffer.dims),
        array_initializer(&buffer.dims, &init)
    ));
}

/// Checksum contribution of a buffer.
pub fn render_hash(session: &Session, id: BufferId, em: &mut Emitter) {
    let buffer = session.buffer(id);
    if buffer.is_view() || !buffer.checksummed {
        return;
    }
    match buffer.space {
        MemorySpace::Constant => {}
        MemorySpace::Private => {
            em.line(format!("for (i = 0; i < {}; i++)", buffer.element_count()));
            em.indent();
            em.line(format!(
                "transparent_crc((({} *){})[i], \"{}[i]\", print_hash_value);",
                buffer.elem, buffer.name, buffer.name
            ));
            em.dedent();
        }
        MemorySpace::Global | MemorySpace::Local => {
            let item = owned_item(session, id);
            em.line(format!("transparent_crc({item}, \"{item}\", print_hash_value);"));
        }
    }
}
