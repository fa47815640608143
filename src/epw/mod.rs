//! Conversion of raw NSRDB CSV files into EnergyPlus weather (EPW) files.

pub mod converter;
pub mod error;
pub mod raw_record;
pub mod weather_record;
