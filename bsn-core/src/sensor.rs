/// Motion sensor attached to a peripheral node.
pub trait Sensor {
    /// Read one raw sample. Called once per acquisition tick.
    ///
    /// `None` means the driver had nothing fresh to deliver on this tick;
    /// the window simply does not grow.
    fn read_sample(&mut self) -> Option<f64>;
}
