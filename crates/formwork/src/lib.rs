//! Reactive asynchronous form validation.
//!
//! A validation tree is built from three control kinds: [`FormControl`] leaf
//! values, keyed [`FormGroup`] composites and ordered [`FormArray`]
//! composites. Validators are async functions producing typed
//! [`ValidationEvent`]s; value changes, activation changes and structural
//! mutations queue revalidation, and [`Control::wait`] drives the tree to a
//! stable fixed point, including cascades where one control's settled value
//! re-arms another control's activation condition.
//!
//! ```no_run
//! use formwork::control::Control;
//! use formwork::field::{FieldOptions, FormControl};
//! use formwork::validators::required_validator;
//!
//! # async fn demo() {
//! let name = FormControl::new(
//!     String::new(),
//!     FieldOptions::default().with_validator(required_validator("Name is required")),
//! );
//! name.wait().await;
//! assert!(!name.valid());
//!
//! name.set_value("Ada".into());
//! name.wait().await;
//! assert!(name.valid());
//! # }
//! ```
//!
//! [`FormControl`]: field::FormControl
//! [`FormGroup`]: group::FormGroup
//! [`FormArray`]: array::FormArray
//! [`ValidationEvent`]: event::ValidationEvent
//! [`Control::wait`]: control::Control::wait

pub mod array;
#[doc(hidden)]
pub mod base;
pub mod control;
pub mod error;
pub mod event;
pub mod field;
pub mod group;
pub mod validators;
pub mod wait;
