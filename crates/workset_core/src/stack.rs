//! Session factories and the per-context session stack.

use crate::module::Module;
use crate::options::UnitOfWorkOptions;
use crate::session::UnitOfWork;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use workset_store::Usecase;

/// The per-context stack of active sessions.
///
/// Opening a session pushes it, pausing pops it without closing, resuming
/// re-pushes, and closing pops. The top is the "current" session, so
/// nested code can reach the innermost active session without threading a
/// session parameter through every call.
///
/// The stack is a cheap-clone handle and is context-confined, like the
/// sessions it tracks.
#[derive(Clone, Default)]
pub struct UnitOfWorkStack {
    sessions: Rc<RefCell<Vec<UnitOfWork>>>,
}

impl UnitOfWorkStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, uow: UnitOfWork) {
        self.sessions.borrow_mut().push(uow);
    }

    pub(crate) fn remove(&self, uow: &UnitOfWork) {
        let mut sessions = self.sessions.borrow_mut();
        if let Some(index) = sessions
            .iter()
            .rposition(|held| UnitOfWork::same(held, uow))
        {
            sessions.remove(index);
        }
    }

    /// Returns the innermost active session, if any.
    #[must_use]
    pub fn current(&self) -> Option<UnitOfWork> {
        self.sessions.borrow().last().cloned()
    }

    /// Returns how many sessions are active on this stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.sessions.borrow().len()
    }

    /// Returns true if no session is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }
}

impl fmt::Debug for UnitOfWorkStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkStack")
            .field("depth", &self.depth())
            .finish()
    }
}

/// Opens sessions over one module for one logical execution context.
///
/// The factory carries its session stack explicitly instead of hiding it
/// in thread-local state: callers pass the factory (or a session clone)
/// down their call chains, and task runtimes that migrate work between
/// threads stay correct. Create one factory per thread or task.
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    module: Arc<Module>,
    stack: UnitOfWorkStack,
}

impl UnitOfWorkFactory {
    /// Creates a factory over a module, with a fresh stack.
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        Self {
            module,
            stack: UnitOfWorkStack::new(),
        }
    }

    /// Returns the module sessions operate on.
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Returns the stack this factory pushes sessions onto.
    #[must_use]
    pub fn stack(&self) -> &UnitOfWorkStack {
        &self.stack
    }

    /// Opens a session with the anonymous usecase and default options.
    #[must_use]
    pub fn new_unit_of_work(&self) -> UnitOfWork {
        self.new_unit_of_work_with(Usecase::default(), UnitOfWorkOptions::default())
    }

    /// Opens a session under the given usecase, with default options.
    #[must_use]
    pub fn new_usecase_unit_of_work(&self, usecase: Usecase) -> UnitOfWork {
        self.new_unit_of_work_with(usecase, UnitOfWorkOptions::default())
    }

    /// Opens a session with an explicit usecase and options.
    #[must_use]
    pub fn new_unit_of_work_with(
        &self,
        usecase: Usecase,
        options: UnitOfWorkOptions,
    ) -> UnitOfWork {
        UnitOfWork::open(
            Arc::clone(&self.module),
            usecase,
            options,
            self.stack.clone(),
        )
    }

    /// Returns the innermost active session on this factory's stack.
    #[must_use]
    pub fn current(&self) -> Option<UnitOfWork> {
        self.stack.current()
    }
}

impl fmt::Debug for UnitOfWorkFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWorkFactory")
            .field("module", self.module.name())
            .field("depth", &self.stack.depth())
            .finish()
    }
}
