mod mock;
mod mqtt;
mod responses;
