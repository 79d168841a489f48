mod discovery;
mod load;
