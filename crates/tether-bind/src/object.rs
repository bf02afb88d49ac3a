//! Shared native objects
//!
//! An [`Obj<T>`] is a counted handle to a native object whose concrete class
//! may be `T` or any class deriving from it. The object lives in a
//! type-erased `Rc<RefCell<dyn Any>>`; a casting table captured from the
//! concrete class projects it to any ancestor through
//! [`NativeClass::as_base`].

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use tether_engine::{Runtime, Value};

use crate::class::{Hold, NativeClass, NoBase};
use crate::convert::{FromRuntime, ToRuntime};
use crate::error::{BridgeError, BridgeResult};

pub(crate) type SharedCell = Rc<RefCell<dyn Any>>;
pub(crate) type WeakCell = Weak<RefCell<dyn Any>>;

type ProjectRef = for<'a> fn(&'a dyn Any, TypeId) -> Option<&'a dyn Any>;
type ProjectMut = for<'a> fn(&'a mut dyn Any, TypeId) -> Option<&'a mut dyn Any>;

/// Casting and lifecycle table of a concrete class.
#[derive(Clone, Copy)]
pub(crate) struct ClassVTable {
    pub name: &'static str,
    pub type_id: TypeId,
    pub hold: Hold,
    project_ref: ProjectRef,
    project_mut: ProjectMut,
    is_a: fn(TypeId) -> bool,
    pub constructor: fn(&mut Runtime) -> BridgeResult<Value>,
    pub on_wrap: fn(&SharedCell),
    pub on_finalize: fn(&SharedCell),
}

impl ClassVTable {
    pub fn of<C: NativeClass>() -> Self {
        Self {
            name: C::NAME,
            type_id: TypeId::of::<C>(),
            hold: C::HOLD,
            project_ref: project_ref::<C>,
            project_mut: project_mut::<C>,
            is_a: is_a::<C>,
            constructor: crate::prototype::constructor_of::<C>,
            on_wrap: run_hook::<C, true>,
            on_finalize: run_hook::<C, false>,
        }
    }

    /// Whether the concrete class is `target` or derives from it
    pub fn is_a(&self, target: TypeId) -> bool {
        (self.is_a)(target)
    }
}

pub(crate) fn has_base<C: NativeClass>() -> bool {
    TypeId::of::<C::Base>() != TypeId::of::<NoBase>()
}

fn project_ref<C: NativeClass>(value: &dyn Any, target: TypeId) -> Option<&dyn Any> {
    let this = value.downcast_ref::<C>()?;
    if TypeId::of::<C>() == target {
        Some(this as &dyn Any)
    } else if has_base::<C>() {
        project_ref::<C::Base>(this.as_base()?, target)
    } else {
        None
    }
}

fn project_mut<C: NativeClass>(value: &mut dyn Any, target: TypeId) -> Option<&mut dyn Any> {
    let this = value.downcast_mut::<C>()?;
    if TypeId::of::<C>() == target {
        Some(this as &mut dyn Any)
    } else if has_base::<C>() {
        project_mut::<C::Base>(this.as_base_mut()?, target)
    } else {
        None
    }
}

fn is_a<C: NativeClass>(target: TypeId) -> bool {
    TypeId::of::<C>() == target || (has_base::<C>() && is_a::<C::Base>(target))
}

fn run_hook<C: NativeClass, const WRAP: bool>(cell: &SharedCell) {
    let obj = Obj::<C>::from_parts(Rc::clone(cell), ClassVTable::of::<C>());
    if WRAP {
        C::on_wrap(&obj);
    } else {
        C::on_finalize(&obj);
    }
}

/// Counted handle to a native object of class `T` (or a subclass).
pub struct Obj<T: NativeClass> {
    cell: SharedCell,
    vtable: ClassVTable,
    _marker: PhantomData<T>,
}

impl<T: NativeClass> Obj<T> {
    /// Move `value` into a new shared object
    pub fn new(value: T) -> Self {
        let cell: SharedCell = Rc::new(RefCell::new(value));
        Self::from_parts(cell, ClassVTable::of::<T>())
    }

    pub(crate) fn from_parts(cell: SharedCell, vtable: ClassVTable) -> Self {
        Self {
            cell,
            vtable,
            _marker: PhantomData,
        }
    }

    pub(crate) fn cell(&self) -> &SharedCell {
        &self.cell
    }

    pub(crate) fn vtable(&self) -> ClassVTable {
        self.vtable
    }

    /// Immutably borrow the object as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the object is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        match self.try_borrow() {
            Ok(guard) => guard,
            Err(e) => panic!("cannot borrow {}: {}", self.vtable.name, e),
        }
    }

    /// Mutably borrow the object as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the object is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        match self.try_borrow_mut() {
            Ok(guard) => guard,
            Err(e) => panic!("cannot borrow {} mutably: {}", self.vtable.name, e),
        }
    }

    /// Immutably borrow the object as `T`
    pub fn try_borrow(&self) -> BridgeResult<Ref<'_, T>> {
        let guard = self
            .cell
            .try_borrow()
            .map_err(|_| BridgeError::error("Object is already mutably borrowed"))?;
        let project = self.vtable.project_ref;
        Ref::filter_map(guard, |any| project(any, TypeId::of::<T>())?.downcast_ref::<T>())
            .map_err(|_| BridgeError::ReceiverConversion { expected: T::NAME })
    }

    /// Mutably borrow the object as `T`
    pub fn try_borrow_mut(&self) -> BridgeResult<RefMut<'_, T>> {
        let guard = self
            .cell
            .try_borrow_mut()
            .map_err(|_| BridgeError::error("Object is already borrowed"))?;
        let project = self.vtable.project_mut;
        RefMut::filter_map(guard, |any| project(any, TypeId::of::<T>())?.downcast_mut::<T>())
            .map_err(|_| BridgeError::ReceiverConversion { expected: T::NAME })
    }

    /// View as an ancestor class. `None` if `P` is not `T`'s class or an
    /// ancestor of the concrete class.
    pub fn upcast<P: NativeClass>(&self) -> Option<Obj<P>> {
        self.cast()
    }

    /// View as a descendant class, if the concrete class derives from `C`
    pub fn downcast<C: NativeClass>(&self) -> Option<Obj<C>> {
        self.cast()
    }

    fn cast<U: NativeClass>(&self) -> Option<Obj<U>> {
        self.vtable
            .is_a(TypeId::of::<U>())
            .then(|| Obj::from_parts(Rc::clone(&self.cell), self.vtable))
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &Obj<impl NativeClass>) -> bool {
        self.addr() == other.addr()
    }

    /// Address of the shared cell; the object's identity
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.cell) as *const () as usize
    }

    /// Number of strong handles, wrappers included
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.cell)
    }

    /// A handle that does not keep the object alive
    pub fn downgrade(&self) -> WeakObj<T> {
        WeakObj {
            cell: Rc::downgrade(&self.cell),
            vtable: self.vtable,
            _marker: PhantomData,
        }
    }

    /// Name of the concrete class
    pub fn class_name(&self) -> &'static str {
        self.vtable.name
    }
}

impl<T: NativeClass> Clone for Obj<T> {
    fn clone(&self) -> Self {
        Self::from_parts(Rc::clone(&self.cell), self.vtable)
    }
}

impl<T: NativeClass> fmt::Debug for Obj<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Obj")
            .field("class", &self.vtable.name)
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("strong", &self.strong_count())
            .finish()
    }
}

/// Non-owning counterpart of [`Obj`].
pub struct WeakObj<T: NativeClass> {
    cell: WeakCell,
    vtable: ClassVTable,
    _marker: PhantomData<T>,
}

impl<T: NativeClass> WeakObj<T> {
    /// The object, if it still exists
    pub fn upgrade(&self) -> Option<Obj<T>> {
        self.cell
            .upgrade()
            .map(|cell| Obj::from_parts(cell, self.vtable))
    }
}

impl<T: NativeClass> Clone for WeakObj<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
            vtable: self.vtable,
            _marker: PhantomData,
        }
    }
}

impl<T: NativeClass> ToRuntime for Obj<T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        crate::prototype::wrap(rt, &self)
    }
}

impl<T: NativeClass> ToRuntime for &Obj<T> {
    fn to_runtime(self, rt: &mut Runtime) -> BridgeResult<Value> {
        crate::prototype::wrap(rt, self)
    }
}

impl<T: NativeClass> FromRuntime for Obj<T> {
    const TYPE_NAME: &'static str = T::NAME;

    fn from_runtime(rt: &mut Runtime, value: Value) -> Option<Self> {
        crate::prototype::unwrap::<T>(rt, value)
    }
}
