mod frames;
pub use self::frames::*;

mod sink;
pub use self::sink::*;

mod timer;
pub use self::timer::*;
