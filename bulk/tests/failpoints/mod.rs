mod bulk_update_test;
