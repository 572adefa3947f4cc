mod proxy;
mod worker;
