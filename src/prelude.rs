use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

pub use crate::globals::GlobalsHandle;
pub use crate::slot::Slot;

pub(crate) use crate::error::{fatal, warning};

#[derive(Debug, Default)]
pub struct RcCell<T: ?Sized>(Rc<RefCell<T>>);

impl<T: ?Sized> Clone for RcCell<T> {
    fn clone(&self) -> Self {
        RcCell(self.0.clone())
    }
}

impl<T> RcCell<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }
}

impl<T: ?Sized> RcCell<T> {
    pub fn borrow(&self) -> Ref<'_, T> {
        (*self.0).borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        (*self.0).borrow_mut()
    }
}

impl<T> std::convert::From<T> for RcCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}
