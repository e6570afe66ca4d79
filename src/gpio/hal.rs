#[cfg(feature = "embedded-hal")]
use embedded_hal::digital::{
    self, ErrorKind, ErrorType, InputPin as InputPinHal, OutputPin as OutputPinHal,
    StatefulOutputPin as StatefulOutputPinHal,
};

use super::{Error, Pin};

#[cfg(feature = "embedded-hal")]
impl digital::Error for Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// `ErrorType` trait implementation for `embedded-hal` v1.0.0.
#[cfg(feature = "embedded-hal")]
impl ErrorType for Pin {
    type Error = Error;
}

/// `InputPin` trait implementation for `embedded-hal` v1.0.0.
#[cfg(feature = "embedded-hal")]
impl InputPinHal for Pin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Pin::is_high(self)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Pin::is_low(self)
    }
}

/// `OutputPin` trait implementation for `embedded-hal` v1.0.0.
#[cfg(feature = "embedded-hal")]
impl OutputPinHal for Pin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Pin::set_low(self)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Pin::set_high(self)
    }
}

/// `StatefulOutputPin` trait implementation for `embedded-hal` v1.0.0.
#[cfg(feature = "embedded-hal")]
impl StatefulOutputPinHal for Pin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Pin::is_high(self)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Pin::is_low(self)
    }

    fn toggle(&mut self) -> Result<(), Self::Error> {
        Pin::toggle(self)
    }
}

/// `OutputPin` trait implementation for `embedded-hal` v0.2.7.
#[cfg(feature = "embedded-hal-0")]
impl embedded_hal_0::digital::v2::OutputPin for Pin {
    type Error = Error;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Pin::set_low(self)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Pin::set_high(self)
    }
}
