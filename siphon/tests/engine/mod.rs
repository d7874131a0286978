mod cdc;
mod full_load;
mod metrics;
mod signal;
