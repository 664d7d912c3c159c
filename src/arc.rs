// SPDX-License-Identifier: BSD-3-Clause
pub use triomphe::Arc;

mod uarc;
pub use uarc::*;
