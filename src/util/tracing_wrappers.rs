// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#[cfg(feature = "tracing")]
#[allow(unused_imports)]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::{__noop_log as debug, __noop_log as error, __noop_log as info};
#[cfg(not(feature = "tracing"))]
#[allow(unused_imports)]
pub use crate::{__noop_log as trace, __noop_log as warn};

#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __noop_log {
    ($($arg:tt)*) => {};
}
