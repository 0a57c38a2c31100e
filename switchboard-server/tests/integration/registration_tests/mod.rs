mod test_register;
