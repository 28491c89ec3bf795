// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

#![allow(missing_docs)]

use bitfield::bitfield;

bitfield! {
    /// bitfields of DIAG_STAT register
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct DiagStat(u16);
    impl Debug;
    /// internal clock lost sync with the external sync input
    pub clock_error, set_clock_error: 7;
    /// flash memory failed its signature test
    pub memory_failure, set_memory_failure: 6;
    /// at least one inertial sensor failed the built-in self test
    pub sensor_failure, set_sensor_failure: 5;
    /// device dropped to standby because the supply voltage sagged
    pub standby_mode, set_standby_mode: 4;
    /// previous SPI frame had an incorrect number of clock cycles
    pub spi_comm_error, set_spi_comm_error: 3;
    /// most recent flash memory update failed
    pub flash_update_failure, set_flash_update_failure: 2;
    /// a new sample overwrote one the host never read
    pub data_path_overrun, set_data_path_overrun: 1;
}

bitfield! {
    /// bitfields of MSC_CTRL register
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MscCtrl(u16);
    impl Debug;
    /// linear g compensation for the gyroscopes
    pub linear_g_comp, set_linear_g_comp: 7;
    /// point of percussion alignment for the accelerometers
    pub pop_align, set_pop_align: 6;
    /// input sync mode select
    pub u8, sync_mode, set_sync_mode: 4, 2;
    /// sync input polarity, true = rising edge
    pub sync_polarity, set_sync_polarity: 1;
    /// data ready polarity, true = active high
    pub dr_polarity, set_dr_polarity: 0;
}

impl DiagStat {
    /// True when any fault flag is raised. Standby is a power condition, not a data
    /// fault, and is excluded.
    pub fn has_fault(&self) -> bool {
        self.clock_error()
            || self.memory_failure()
            || self.sensor_failure()
            || self.spi_comm_error()
            || self.flash_update_failure()
            || self.data_path_overrun()
    }
}
